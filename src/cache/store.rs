//! Cache storage.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use thiserror::Error;
use tokio::time::Instant;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cached value could not be decoded: {0}")]
    Codec(String),
}

/// Key/value store with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    async fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;
}

struct Entry {
    value: Bytes,
    expires_at: Instant,
}

/// In-process LRU store with TTL expiry checked on read.
///
/// Uses the tokio clock so paused-time tests can advance past a TTL.
pub struct TtlStore {
    entries: RwLock<LruCache<String, Entry>>,
    available: AtomicBool,
}

impl TtlStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.capacity_non_zero())),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the store going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_available(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable("store marked unavailable".into()))
        }
    }
}

#[async_trait]
impl CacheStore for TtlStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        self.ensure_available()?;
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.ensure_available()?;
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        rw_write(&self.entries, SOURCE, "set_with_ttl").put(key.to_string(), entry);
        Ok(())
    }
}
