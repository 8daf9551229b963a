use async_trait::async_trait;
use uuid::Uuid;

use crate::application::repos::{
    EngagementRepo, LikeOutcome, NewCommentParams, RepoError, ViewOutcome,
};
use crate::domain::entities::CommentRecord;
use crate::infra::db::{PostgresRepositories, convert_count, map_sqlx_error};

use super::types::CommentRow;

impl PostgresRepositories {
    async fn current_likes(&self, id: Uuid) -> Result<u64, RepoError> {
        let count: Option<i32> =
            sqlx::query_scalar("SELECT cardinality(likes) FROM posts WHERE id = $1")
                .bind(id)
                .fetch_optional(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        count
            .map(|count| convert_count(i64::from(count)))
            .unwrap_or(Err(RepoError::NotFound))
    }
}

#[async_trait]
impl EngagementRepo for PostgresRepositories {
    async fn record_view(&self, id: Uuid, viewer: Option<Uuid>) -> Result<ViewOutcome, RepoError> {
        // the row lock taken by UPDATE makes the membership check and append atomic
        let counted: Option<i64> = sqlx::query_scalar(
            "UPDATE posts SET views = views + 1, \
                 viewed_by = CASE WHEN $2::uuid IS NULL THEN viewed_by \
                                  ELSE array_append(viewed_by, $2::uuid) END \
             WHERE id = $1 AND ($2::uuid IS NULL OR NOT ($2::uuid = ANY(viewed_by))) \
             RETURNING views",
        )
        .bind(id)
        .bind(viewer)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if let Some(views) = counted {
            return Ok(ViewOutcome::Counted {
                views: convert_count(views)?,
            });
        }

        let views: Option<i64> = sqlx::query_scalar("SELECT views FROM posts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        match views {
            Some(views) => Ok(ViewOutcome::AlreadyCounted {
                views: convert_count(views)?,
            }),
            None => Err(RepoError::NotFound),
        }
    }

    async fn add_like(&self, id: Uuid, user_id: Uuid) -> Result<LikeOutcome, RepoError> {
        let updated: Option<i32> = sqlx::query_scalar(
            "UPDATE posts SET likes = array_append(likes, $2) \
             WHERE id = $1 AND NOT ($2 = ANY(likes)) \
             RETURNING cardinality(likes)",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match updated {
            Some(count) => Ok(LikeOutcome {
                changed: true,
                likes_count: convert_count(i64::from(count))?,
            }),
            None => Ok(LikeOutcome {
                changed: false,
                likes_count: self.current_likes(id).await?,
            }),
        }
    }

    async fn remove_like(&self, id: Uuid, user_id: Uuid) -> Result<LikeOutcome, RepoError> {
        let updated: Option<i32> = sqlx::query_scalar(
            "UPDATE posts SET likes = array_remove(likes, $2) \
             WHERE id = $1 AND $2 = ANY(likes) \
             RETURNING cardinality(likes)",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match updated {
            Some(count) => Ok(LikeOutcome {
                changed: true,
                likes_count: convert_count(i64::from(count))?,
            }),
            None => Ok(LikeOutcome {
                changed: false,
                likes_count: self.current_likes(id).await?,
            }),
        }
    }

    async fn add_comment(&self, params: NewCommentParams) -> Result<CommentRecord, RepoError> {
        let row = sqlx::query_as::<_, CommentRow>(
            "INSERT INTO post_comments (id, post_id, user_id, content) \
             SELECT $1, id, $3, $4 FROM posts WHERE id = $2 \
             RETURNING id, post_id, user_id, content, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(params.post_id)
        .bind(params.user_id)
        .bind(&params.content)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        Ok(CommentRecord::from(row))
    }

    async fn record_share(&self, id: Uuid) -> Result<u64, RepoError> {
        let shares: i64 = sqlx::query_scalar(
            "UPDATE posts SET shares = shares + 1 WHERE id = $1 RETURNING shares",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;
        convert_count(shares)
    }
}
