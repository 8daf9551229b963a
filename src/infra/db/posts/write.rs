use async_trait::async_trait;
use uuid::Uuid;

use crate::application::repos::{CreatePostParams, PostsWriteRepo, RepoError, UpdatePostParams};
use crate::domain::entities::PostRecord;
use crate::infra::db::{PostgresRepositories, map_sqlx_error};

use super::fetch_comments;
use super::types::{POST_COLUMNS, PostRow, assemble};

fn reading_time_param(minutes: u32) -> i32 {
    i32::try_from(minutes).unwrap_or(i32::MAX)
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "INSERT INTO posts (id, author_id, title, content, slug, status, tags, \
                                featured_image, excerpt, reading_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {POST_COLUMNS}"
        ))
        .bind(params.id)
        .bind(params.author_id)
        .bind(&params.title)
        .bind(&params.content)
        .bind(&params.slug)
        .bind(params.status)
        .bind(&params.tags)
        .bind(params.featured_image.as_deref())
        .bind(params.excerpt.as_deref())
        .bind(reading_time_param(params.reading_time))
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into_record(Vec::new()))
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "UPDATE posts SET title = $2, content = $3, slug = $4, status = $5, tags = $6, \
                              featured_image = $7, excerpt = COALESCE($8, excerpt), \
                              reading_time = $9, updated_at = now() \
             WHERE id = $1 \
             RETURNING {POST_COLUMNS}"
        ))
        .bind(params.id)
        .bind(&params.title)
        .bind(&params.content)
        .bind(&params.slug)
        .bind(params.status)
        .bind(&params.tags)
        .bind(params.featured_image.as_deref())
        .bind(params.excerpt.as_deref())
        .bind(reading_time_param(params.reading_time))
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        let comments = fetch_comments(self.pool(), &[row.id]).await?;
        assemble(vec![row], comments)
            .pop()
            .ok_or(RepoError::NotFound)
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn update_excerpt(&self, id: Uuid, excerpt: &str) -> Result<(), RepoError> {
        let result = sqlx::query("UPDATE posts SET excerpt = $2 WHERE id = $1")
            .bind(id)
            .bind(excerpt)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
