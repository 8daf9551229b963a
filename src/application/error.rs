use thiserror::Error;

use crate::application::jobs::QueueError;
use crate::application::posts::PostError;
use crate::application::repos::RepoError;
use crate::{domain::error::DomainError, infra::error::InfraError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Domain(DomainError::NotFound { .. }) | AppError::NotFound => 2,
            AppError::Domain(DomainError::Validation { .. }) | AppError::Validation(_) => 3,
            AppError::Infra(InfraError::Database { .. } | InfraError::Queue { .. }) => 4,
            AppError::Infra(_) | AppError::Domain(DomainError::Invariant { .. }) => 1,
            AppError::Unexpected(_) => 1,
        }
    }
}

impl From<PostError> for AppError {
    fn from(err: PostError) -> Self {
        match err {
            PostError::NotFound => AppError::NotFound,
            PostError::Validation(err) => AppError::Domain(err),
            PostError::Forbidden { .. } | PostError::Slug(_) => {
                AppError::validation(err.to_string())
            }
            PostError::Repo(err) => AppError::from(err),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => AppError::NotFound,
            other => AppError::Infra(InfraError::database(other.to_string())),
        }
    }
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        AppError::Infra(InfraError::queue(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_not_found() {
        assert_eq!(AppError::from(PostError::NotFound).exit_code(), 2);
        assert_eq!(AppError::validation("bad").exit_code(), 3);
        assert_eq!(AppError::from(RepoError::Timeout).exit_code(), 4);
    }
}
