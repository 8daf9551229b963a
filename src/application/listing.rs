//! Read-through cached post listing.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::application::repos::{PostListFilter, PostsRepo, RepoError};
use crate::cache::{CacheError, CacheStore, ListingKey};
use crate::domain::entities::PostRecord;
use crate::domain::types::PostStatus;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 50;
pub const DEFAULT_LISTING_TTL: Duration = Duration::from_secs(600);

/// Raw listing parameters as a caller supplies them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingQuery {
    pub status: Option<PostStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListingQuery {
    /// Clamp to `page >= 1`, `1 <= limit <= 50`; status defaults to Published.
    pub fn normalize(&self) -> ListingKey {
        ListingKey {
            status: self.status.unwrap_or(PostStatus::Published),
            page: self.page.unwrap_or(1).max(1),
            limit: self
                .limit
                .unwrap_or(DEFAULT_PAGE_LIMIT)
                .clamp(1, MAX_PAGE_LIMIT),
        }
    }
}

pub(crate) fn page_offset(page: u32, limit: u32) -> u64 {
    u64::from(page.saturating_sub(1)) * u64::from(limit)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current: u32,
    pub pages: u64,
    pub total: u64,
}

impl Pagination {
    pub fn new(current: u32, limit: u32, total: u64) -> Self {
        Self {
            current,
            pages: total.div_ceil(u64::from(limit.max(1))),
            total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostListing {
    pub data: Vec<PostRecord>,
    pub pagination: Pagination,
}

pub struct ListingService {
    reader: Arc<dyn PostsRepo>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
    fills: DashMap<ListingKey, Arc<Mutex<()>>>,
}

impl ListingService {
    pub fn new(reader: Arc<dyn PostsRepo>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            reader,
            cache,
            ttl: DEFAULT_LISTING_TTL,
            fills: DashMap::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Serve a listing page from cache, falling back to the store on a miss.
    ///
    /// Concurrent misses for the same key share one store round-trip. Cache
    /// failures of any kind degrade to a miss.
    pub async fn get_listing(&self, query: ListingQuery) -> Result<PostListing, RepoError> {
        let key = query.normalize();
        let cache_key = key.to_string();

        if let Some(listing) = self.lookup(&cache_key).await {
            counter!("scriptorium_listing_cache_hit_total").increment(1);
            return Ok(listing);
        }

        let fill = self.fills.entry(key).or_default().clone();
        let result = {
            let _guard = fill.lock().await;
            match self.lookup(&cache_key).await {
                Some(listing) => {
                    counter!("scriptorium_listing_cache_hit_total").increment(1);
                    Ok(listing)
                }
                None => {
                    counter!("scriptorium_listing_cache_miss_total").increment(1);
                    self.fill(key, &cache_key).await
                }
            }
        };
        drop(fill);
        self.fills
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn fill(&self, key: ListingKey, cache_key: &str) -> Result<PostListing, RepoError> {
        let filter = PostListFilter {
            status: Some(key.status),
            author_id: None,
        };
        let offset = page_offset(key.page, key.limit);
        let (data, total) = futures::try_join!(
            self.reader.list_posts(&filter, offset, key.limit),
            self.reader.count_posts(&filter),
        )?;

        let listing = PostListing {
            data,
            pagination: Pagination::new(key.page, key.limit, total),
        };

        if let Err(err) = self.store(cache_key, &listing).await {
            warn!(
                target = "application::listing",
                key = cache_key,
                error = %err,
                "failed to populate listing cache"
            );
        }

        Ok(listing)
    }

    async fn lookup(&self, cache_key: &str) -> Option<PostListing> {
        let bytes = match self.cache.get(cache_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                warn!(
                    target = "application::listing",
                    key = cache_key,
                    error = %err,
                    "listing cache unavailable; treating as miss"
                );
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(listing) => {
                debug!(target = "application::listing", key = cache_key, "cache hit");
                Some(listing)
            }
            Err(err) => {
                warn!(
                    target = "application::listing",
                    key = cache_key,
                    error = %err,
                    "discarding undecodable cache entry"
                );
                None
            }
        }
    }

    async fn store(&self, cache_key: &str, listing: &PostListing) -> Result<(), CacheError> {
        let encoded =
            serde_json::to_vec(listing).map_err(|err| CacheError::Codec(err.to_string()))?;
        self.cache
            .set_with_ttl(cache_key, Bytes::from(encoded), self.ttl)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_normalization_clamps() {
        let key = ListingQuery::default().normalize();
        assert_eq!(key.status, PostStatus::Published);
        assert_eq!(key.page, 1);
        assert_eq!(key.limit, 10);

        let key = ListingQuery {
            status: Some(PostStatus::Draft),
            page: Some(0),
            limit: Some(500),
        }
        .normalize();
        assert_eq!(key.page, 1);
        assert_eq!(key.limit, 50);

        let key = ListingQuery {
            limit: Some(0),
            ..ListingQuery::default()
        }
        .normalize();
        assert_eq!(key.limit, 1);
    }

    #[test]
    fn pagination_rounds_pages_up() {
        assert_eq!(Pagination::new(1, 10, 0).pages, 0);
        assert_eq!(Pagination::new(1, 10, 10).pages, 1);
        assert_eq!(Pagination::new(2, 10, 11).pages, 2);
    }

    #[test]
    fn offsets_follow_page_and_limit() {
        assert_eq!(page_offset(1, 10), 0);
        assert_eq!(page_offset(3, 25), 50);
    }
}
