//! Reader-driven mutations: views, likes, comments, and shares.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::application::repos::{
    EngagementRepo, LikeOutcome, NewCommentParams, PostsRepo, ViewOutcome,
};
use crate::domain::entities::{CommentRecord, PostRecord};
use crate::domain::posts::validate_comment;

use super::types::PostError;

#[derive(Clone)]
pub struct EngagementService {
    reader: Arc<dyn PostsRepo>,
    repo: Arc<dyn EngagementRepo>,
}

impl EngagementService {
    pub fn new(reader: Arc<dyn PostsRepo>, repo: Arc<dyn EngagementRepo>) -> Self {
        Self { reader, repo }
    }

    /// Count a view. A known viewer is counted once; anonymous views always count.
    pub async fn record_view(
        &self,
        post_id: Uuid,
        viewer: Option<Uuid>,
    ) -> Result<ViewOutcome, PostError> {
        let outcome = self.repo.record_view(post_id, viewer).await?;
        debug!(
            target = "application::posts::record_view",
            post_id = %post_id,
            outcome = ?outcome,
            "view recorded"
        );
        Ok(outcome)
    }

    /// Load a post for reading and count the view.
    pub async fn read_by_slug(
        &self,
        slug: &str,
        viewer: Option<Uuid>,
    ) -> Result<PostRecord, PostError> {
        let mut post = self
            .reader
            .find_by_slug(slug)
            .await?
            .ok_or(PostError::NotFound)?;

        let outcome = self.record_view(post.id, viewer).await?;
        post.meta.views = outcome.views();
        if let (ViewOutcome::Counted { .. }, Some(viewer)) = (outcome, viewer) {
            if !post.viewed_by.contains(&viewer) {
                post.viewed_by.push(viewer);
            }
        }
        Ok(post)
    }

    pub async fn like(&self, post_id: Uuid, user_id: Uuid) -> Result<LikeOutcome, PostError> {
        Ok(self.repo.add_like(post_id, user_id).await?)
    }

    pub async fn unlike(&self, post_id: Uuid, user_id: Uuid) -> Result<LikeOutcome, PostError> {
        Ok(self.repo.remove_like(post_id, user_id).await?)
    }

    pub async fn add_comment(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        content: &str,
    ) -> Result<CommentRecord, PostError> {
        let content = validate_comment(content)?;
        Ok(self
            .repo
            .add_comment(NewCommentParams {
                post_id,
                user_id,
                content,
            })
            .await?)
    }

    pub async fn record_share(&self, post_id: Uuid) -> Result<u64, PostError> {
        Ok(self.repo.record_share(post_id).await?)
    }
}
