//! Seam for the external text summarizer.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SummarizerError {
    #[error("summarizer request failed: {0}")]
    Request(String),
    #[error("summarizer responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("summarizer response could not be decoded: {0}")]
    Decode(String),
}

/// Black-box `summarize(text) -> text`. Calls may take several seconds.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> Result<String, SummarizerError>;
}
