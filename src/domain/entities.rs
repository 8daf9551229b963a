//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{JobState, PostStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostMeta {
    pub views: u64,
    pub shares: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
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
    pub likes: Vec<Uuid>,
    pub viewed_by: Vec<Uuid>,
    pub meta: PostMeta,
    pub comments: Vec<CommentRecord>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl PostRecord {
    pub fn likes_count(&self) -> usize {
        self.likes.len()
    }

    pub fn comments_count(&self) -> usize {
        self.comments.len()
    }

    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }

    pub fn is_author(&self, user_id: Uuid) -> bool {
        self.author_id == user_id
    }
}

/// Snapshot of a queued job, as exposed to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub queue: String,
    pub payload: serde_json::Value,
    pub state: JobState,
    pub attempts: u32,
    pub max_attempts: u32,
    pub priority: i32,
    pub enqueued_at: OffsetDateTime,
    pub run_at: OffsetDateTime,
    pub last_error: Option<String>,
    pub failed_at: Option<OffsetDateTime>,
}
