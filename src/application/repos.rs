//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{CommentRecord, PostRecord};
use crate::domain::types::PostStatus;

/// Name of the unique constraint guarding `posts.slug`.
pub const POST_SLUG_CONSTRAINT: &str = "posts_slug_key";

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn is_slug_conflict(&self) -> bool {
        matches!(self, RepoError::Duplicate { constraint } if constraint == POST_SLUG_CONSTRAINT)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostListFilter {
    pub status: Option<PostStatus>,
    pub author_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub status: PostStatus,
    pub tags: Vec<String>,
    pub featured_image: Option<String>,
    pub excerpt: Option<String>,
    pub reading_time: u32,
}

/// Full replacement of the author-owned fields.
///
/// `excerpt` is only written when the author supplied one; otherwise the
/// stored value (possibly written by the summarization worker) is kept.
#[derive(Debug, Clone)]
pub struct UpdatePostParams {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub status: PostStatus,
    pub tags: Vec<String>,
    pub featured_image: Option<String>,
    pub excerpt: Option<String>,
    pub reading_time: u32,
}

#[derive(Debug, Clone)]
pub struct NewCommentParams {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewOutcome {
    Counted { views: u64 },
    AlreadyCounted { views: u64 },
}

impl ViewOutcome {
    pub fn views(self) -> u64 {
        match self {
            ViewOutcome::Counted { views } | ViewOutcome::AlreadyCounted { views } => views,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeOutcome {
    pub changed: bool,
    pub likes_count: u64,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError>;

    /// Newest first.
    async fn list_posts(
        &self,
        filter: &PostListFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<PostRecord>, RepoError>;

    async fn count_posts(&self, filter: &PostListFilter) -> Result<u64, RepoError>;

    /// Published posts other than `post` sharing a tag or its author, newest first.
    async fn find_related(&self, post: &PostRecord, limit: u32)
    -> Result<Vec<PostRecord>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    /// Fails with [`RepoError::Duplicate`] naming [`POST_SLUG_CONSTRAINT`]
    /// when the slug is already taken.
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError>;

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError>;

    /// Write the excerpt field alone. Leaves every other column, including
    /// `updated_at`, untouched.
    async fn update_excerpt(&self, id: Uuid, excerpt: &str) -> Result<(), RepoError>;
}

/// Reader-driven counters. None of these bump `updated_at`.
#[async_trait]
pub trait EngagementRepo: Send + Sync {
    async fn record_view(&self, id: Uuid, viewer: Option<Uuid>) -> Result<ViewOutcome, RepoError>;

    async fn add_like(&self, id: Uuid, user_id: Uuid) -> Result<LikeOutcome, RepoError>;

    async fn remove_like(&self, id: Uuid, user_id: Uuid) -> Result<LikeOutcome, RepoError>;

    async fn add_comment(&self, params: NewCommentParams) -> Result<CommentRecord, RepoError>;

    async fn record_share(&self, id: Uuid) -> Result<u64, RepoError>;
}
