mod engagement;
mod read;
mod types;
mod write;

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::application::repos::RepoError;

use super::map_sqlx_error;
use types::CommentRow;

async fn fetch_comments<'e, E>(executor: E, post_ids: &[Uuid]) -> Result<Vec<CommentRow>, RepoError>
where
    E: Executor<'e, Database = Postgres>,
{
    if post_ids.is_empty() {
        return Ok(Vec::new());
    }
    sqlx::query_as::<_, CommentRow>(
        "SELECT id, post_id, user_id, content, created_at \
         FROM post_comments WHERE post_id = ANY($1) ORDER BY seq",
    )
    .bind(post_ids)
    .fetch_all(executor)
    .await
    .map_err(map_sqlx_error)
}
