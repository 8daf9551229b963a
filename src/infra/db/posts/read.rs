use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::application::repos::{PostListFilter, PostsRepo, RepoError};
use crate::domain::entities::PostRecord;
use crate::domain::types::PostStatus;
use crate::infra::db::{PostgresRepositories, convert_count, map_sqlx_error};

use super::fetch_comments;
use super::types::{POST_COLUMNS, PostRow, assemble};

fn apply_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &PostListFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status);
    }
    if let Some(author_id) = filter.author_id {
        qb.push(" AND author_id = ");
        qb.push_bind(author_id);
    }
}

impl PostgresRepositories {
    async fn load_one(&self, row: Option<PostRow>) -> Result<Option<PostRecord>, RepoError> {
        let Some(row) = row else {
            return Ok(None);
        };
        let comments = fetch_comments(self.pool(), &[row.id]).await?;
        Ok(assemble(vec![row], comments).pop())
    }

    async fn load_many(&self, rows: Vec<PostRow>) -> Result<Vec<PostRecord>, RepoError> {
        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let comments = fetch_comments(self.pool(), &ids).await?;
        Ok(assemble(rows, comments))
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        self.load_one(row).await
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        self.load_one(row).await
    }

    async fn list_posts(
        &self,
        filter: &PostListFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!("SELECT {POST_COLUMNS} FROM posts WHERE 1=1"));
        apply_filter(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(i64::from(limit));
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(offset).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        self.load_many(rows).await
    }

    async fn count_posts(&self, filter: &PostListFilter) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts WHERE 1=1");
        apply_filter(&mut qb, filter);
        let count: i64 = qb
            .build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        convert_count(count)
    }

    async fn find_related(
        &self,
        post: &PostRecord,
        limit: u32,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE status = $1 AND id <> $2 AND (tags && $3 OR author_id = $4) \
             ORDER BY created_at DESC, id DESC LIMIT $5"
        ))
        .bind(PostStatus::Published)
        .bind(post.id)
        .bind(&post.tags)
        .bind(post.author_id)
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        self.load_many(rows).await
    }
}
