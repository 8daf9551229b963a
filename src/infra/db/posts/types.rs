use std::collections::HashMap;

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{CommentRecord, PostMeta, PostRecord};
use crate::domain::types::PostStatus;

pub(super) const POST_COLUMNS: &str = "id, author_id, title, content, slug, status, tags, \
    featured_image, excerpt, reading_time, likes, viewed_by, views, shares, created_at, updated_at";

#[derive(Debug, FromRow)]
pub(super) struct PostRow {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub status: PostStatus,
    pub tags: Vec<String>,
    pub featured_image: Option<String>,
    pub excerpt: Option<String>,
    pub reading_time: i32,
    pub likes: Vec<Uuid>,
    pub viewed_by: Vec<Uuid>,
    pub views: i64,
    pub shares: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
pub(super) struct CommentRow {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: OffsetDateTime,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

impl PostRow {
    pub(super) fn into_record(self, comments: Vec<CommentRecord>) -> PostRecord {
        PostRecord {
            id: self.id,
            author_id: self.author_id,
            title: self.title,
            content: self.content,
            slug: self.slug,
            status: self.status,
            tags: self.tags,
            featured_image: self.featured_image,
            excerpt: self.excerpt,
            reading_time: u32::try_from(self.reading_time).unwrap_or_default(),
            likes: self.likes,
            viewed_by: self.viewed_by,
            meta: PostMeta {
                views: u64::try_from(self.views).unwrap_or_default(),
                shares: u64::try_from(self.shares).unwrap_or_default(),
            },
            comments,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Attach comments (already ordered) to their posts, keeping post order.
pub(super) fn assemble(rows: Vec<PostRow>, comments: Vec<CommentRow>) -> Vec<PostRecord> {
    let mut by_post: HashMap<Uuid, Vec<CommentRecord>> = HashMap::new();
    for comment in comments {
        by_post
            .entry(comment.post_id)
            .or_default()
            .push(CommentRecord::from(comment));
    }
    rows.into_iter()
        .map(|row| {
            let comments = by_post.remove(&row.id).unwrap_or_default();
            row.into_record(comments)
        })
        .collect()
}
