//! Application services: post mutations, listing, engagement, and the
//! background enrichment jobs.

pub mod error;
pub mod jobs;
pub mod listing;
pub mod posts;
pub mod repos;
pub mod summarizer;
