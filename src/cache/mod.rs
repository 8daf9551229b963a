//! Read-through cache for the public post listing.
//!
//! Entries are opaque byte blobs keyed by string and expire after a TTL.
//! The store may be unreachable; callers treat every cache error as a miss.

mod config;
mod keys;
pub(crate) mod lock;
mod store;

pub use config::CacheConfig;
pub use keys::ListingKey;
pub use store::{CacheError, CacheStore, TtlStore};
