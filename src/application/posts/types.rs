use thiserror::Error;
use uuid::Uuid;

use crate::application::jobs::EnqueueOutcome;
use crate::application::repos::RepoError;
use crate::domain::entities::PostRecord;
use crate::domain::error::DomainError;
use crate::domain::slug::SlugError;
use crate::domain::types::PostStatus;

#[derive(Debug, Error)]
pub enum PostError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("post not found")]
    NotFound,
    #[error("user `{user_id}` is not the author of this post")]
    Forbidden { user_id: Uuid },
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for PostError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => PostError::NotFound,
            other => PostError::Repo(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatePostCommand {
    pub author_id: Uuid,
    pub title: String,
    pub content: String,
    pub status: PostStatus,
    pub tags: Vec<String>,
    pub featured_image: Option<String>,
    /// Author-supplied excerpt; when present no summary is generated.
    pub excerpt: Option<String>,
}

/// Partial edit. `None` leaves the stored value as it is.
#[derive(Debug, Clone, Default)]
pub struct UpdatePostCommand {
    pub id: Uuid,
    pub title: Option<String>,
    pub content: Option<String>,
    pub status: Option<PostStatus>,
    pub tags: Option<Vec<String>>,
    pub featured_image: Option<String>,
    pub excerpt: Option<String>,
}

/// Whether and how the asynchronous excerpt was requested for a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enrichment {
    NotNeeded,
    Scheduled(EnqueueOutcome),
    /// The queue refused the job; the post was saved regardless.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct PostMutation {
    pub post: PostRecord,
    pub enrichment: Enrichment,
}
