//! Listing cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_CAPACITY: usize = 1_000;
const DEFAULT_LISTING_TTL_SECONDS: u64 = 600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum entries kept before LRU eviction.
    pub capacity: usize,
    pub listing_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            listing_ttl: Duration::from_secs(DEFAULT_LISTING_TTL_SECONDS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            capacity: settings.capacity,
            listing_ttl: Duration::from_secs(settings.listing_ttl_seconds.get()),
        }
    }
}

impl CacheConfig {
    /// Capacity as `NonZeroUsize`, clamping to 1 if zero.
    pub fn capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttl_is_ten_minutes() {
        let config = CacheConfig::default();
        assert_eq!(config.listing_ttl, Duration::from_secs(600));
        assert_eq!(config.capacity, 1_000);
    }

    #[test]
    fn zero_capacity_clamps_to_one() {
        let config = CacheConfig {
            capacity: 0,
            ..CacheConfig::default()
        };
        assert_eq!(config.capacity_non_zero().get(), 1);
    }
}
