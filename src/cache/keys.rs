//! Cache key definitions.

use std::fmt;

use crate::domain::types::PostStatus;

/// Key for one page of the post listing: `posts:{status}:{page}:{limit}`.
///
/// Only ever built from a normalized query, so equal listings share a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListingKey {
    pub status: PostStatus,
    pub page: u32,
    pub limit: u32,
}

impl fmt::Display for ListingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "posts:{}:{}:{}", self.status, self.page, self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_key_format() {
        let key = ListingKey {
            status: PostStatus::Published,
            page: 2,
            limit: 10,
        };
        assert_eq!(key.to_string(), "posts:Published:2:10");
    }
}
