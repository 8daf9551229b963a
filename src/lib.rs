//! Scriptorium: the enrichment core of a blog publishing platform.
//!
//! Post writes flow through an explicit mutation pipeline (slug, reading
//! time, summarization scheduling), a single-consumer worker fills excerpts
//! asynchronously, and the public listing is served through a TTL-bounded
//! read-through cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
