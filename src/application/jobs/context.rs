use std::sync::Arc;

use thiserror::Error;

use crate::application::repos::{PostsWriteRepo, RepoError};
use crate::application::summarizer::{Summarizer, SummarizerError};

/// Shared context passed to job handlers so they can reach the post store and
/// the summarizer.
#[derive(Clone)]
pub struct JobWorkerContext {
    pub posts: Arc<dyn PostsWriteRepo>,
    pub summarizer: Arc<dyn Summarizer>,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid job payload: {0}")]
    InvalidPayload(String),
    #[error(transparent)]
    Summarizer(#[from] SummarizerError),
    #[error("failed to store excerpt: {0}")]
    StoreUpdate(#[source] RepoError),
}

impl JobError {
    /// Malformed payloads never succeed on retry; everything else might.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, JobError::InvalidPayload(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_payload_errors_are_permanent() {
        assert!(!JobError::InvalidPayload("x".into()).is_retryable());
        assert!(JobError::Summarizer(SummarizerError::Request("down".into())).is_retryable());
        assert!(JobError::StoreUpdate(RepoError::Timeout).is_retryable());
    }
}
