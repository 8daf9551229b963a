use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::domain::posts::truncate_excerpt;

use super::context::{JobError, JobWorkerContext};
use super::queue::{EnqueueOutcome, JobOptions, JobQueue, QueueError, enqueue_job};

pub const SUMMARIZATION_JOB_PREFIX: &str = "summarize-";

/// One job id per post, so repeated edits collapse into a single pending job.
pub fn summarization_job_id(post_id: Uuid) -> String {
    format!("{SUMMARIZATION_JOB_PREFIX}{post_id}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizationJobPayload {
    pub post_id: Uuid,
    pub content: String,
}

pub async fn enqueue_summarization_job<Q: JobQueue + ?Sized>(
    queue: &Q,
    post_id: Uuid,
    content: String,
    priority: i32,
) -> Result<EnqueueOutcome, QueueError> {
    let payload = SummarizationJobPayload { post_id, content };
    enqueue_job(
        queue,
        summarization_job_id(post_id),
        &payload,
        JobOptions {
            priority,
            delay: None,
        },
    )
    .await
}

/// Summarize the payload content and write the result into the post excerpt.
///
/// A post deleted since enqueue is not an error: there is nothing left to
/// enrich, so the job completes.
pub async fn process_summarization_job(
    payload: &serde_json::Value,
    ctx: &JobWorkerContext,
) -> Result<(), JobError> {
    let payload: SummarizationJobPayload = serde_json::from_value(payload.clone())
        .map_err(|err| JobError::InvalidPayload(err.to_string()))?;
    if payload.content.trim().is_empty() {
        return Err(JobError::InvalidPayload("content is empty".into()));
    }

    let summary = ctx.summarizer.summarize(&payload.content).await?;
    let excerpt = truncate_excerpt(&summary);

    match ctx.posts.update_excerpt(payload.post_id, &excerpt).await {
        Ok(()) => {
            info!(
                target = "application::jobs::process_summarization_job",
                post_id = %payload.post_id,
                excerpt_chars = excerpt.chars().count(),
                "excerpt updated"
            );
            Ok(())
        }
        Err(RepoError::NotFound) => {
            warn!(
                target = "application::jobs::process_summarization_job",
                post_id = %payload.post_id,
                "post no longer exists; dropping summary"
            );
            Ok(())
        }
        Err(err) => Err(JobError::StoreUpdate(err)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::application::repos::{CreatePostParams, PostsRepo, PostsWriteRepo};
    use crate::application::summarizer::{Summarizer, SummarizerError};
    use crate::domain::types::PostStatus;
    use crate::infra::memory::MemoryPostStore;

    struct FixedSummarizer(String);

    impl FixedSummarizer {
        fn new(summary: impl Into<String>) -> Arc<Self> {
            Arc::new(Self(summary.into()))
        }
    }

    #[async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, _text: &str) -> Result<String, SummarizerError> {
            Ok(self.0.clone())
        }
    }

    struct DownSummarizer;

    #[async_trait]
    impl Summarizer for DownSummarizer {
        async fn summarize(&self, _text: &str) -> Result<String, SummarizerError> {
            Err(SummarizerError::Status {
                status: 503,
                body: "model loading".into(),
            })
        }
    }

    async fn seeded(
        summarizer: Arc<dyn Summarizer>,
    ) -> (Arc<MemoryPostStore>, Uuid, JobWorkerContext) {
        let store = Arc::new(MemoryPostStore::new());
        let post = store
            .create_post(CreatePostParams {
                id: Uuid::new_v4(),
                author_id: Uuid::new_v4(),
                title: "Queued post".into(),
                content: "Body text long enough to summarize.".into(),
                slug: "queued-post".into(),
                status: PostStatus::Draft,
                tags: Vec::new(),
                featured_image: None,
                excerpt: None,
                reading_time: 1,
            })
            .await
            .expect("create");
        let ctx = JobWorkerContext {
            posts: store.clone(),
            summarizer,
        };
        (store, post.id, ctx)
    }

    #[test]
    fn job_ids_are_keyed_by_post() {
        let id = Uuid::nil();
        assert_eq!(
            summarization_job_id(id),
            "summarize-00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn payload_uses_camel_case_fields() {
        let payload = SummarizationJobPayload {
            post_id: Uuid::nil(),
            content: "text".into(),
        };
        let value = serde_json::to_value(&payload).expect("json");
        assert_eq!(value["postId"], json!("00000000-0000-0000-0000-000000000000"));
        assert_eq!(value["content"], json!("text"));
    }

    #[tokio::test]
    async fn summary_lands_in_excerpt_truncated() {
        let (store, post_id, ctx) = seeded(FixedSummarizer::new("word ".repeat(80))).await;

        let payload = json!({"postId": post_id, "content": "Body text"});
        process_summarization_job(&payload, &ctx).await.expect("job");

        let post = store.find_by_id(post_id).await.expect("find").expect("post");
        let excerpt = post.excerpt.expect("excerpt");
        assert!(excerpt.chars().count() <= 200);
        assert!(excerpt.starts_with("word word"));
    }

    #[tokio::test]
    async fn missing_content_is_a_permanent_failure() {
        let (store, post_id, ctx) = seeded(FixedSummarizer::new("unused")).await;

        let err = process_summarization_job(&json!({"postId": post_id, "content": "  "}), &ctx)
            .await
            .expect_err("empty content");
        assert!(!err.is_retryable());

        let err = process_summarization_job(&json!({"postId": post_id}), &ctx)
            .await
            .expect_err("no content");
        assert!(matches!(err, JobError::InvalidPayload(_)));

        let post = store.find_by_id(post_id).await.expect("find").expect("post");
        assert!(post.excerpt.is_none());
    }

    #[tokio::test]
    async fn summarizer_failure_is_retryable_and_leaves_excerpt() {
        let (store, post_id, ctx) = seeded(Arc::new(DownSummarizer)).await;

        let err = process_summarization_job(&json!({"postId": post_id, "content": "x y z"}), &ctx)
            .await
            .expect_err("summarizer down");
        assert!(err.is_retryable());
        assert!(matches!(err, JobError::Summarizer(_)));

        let post = store.find_by_id(post_id).await.expect("find").expect("post");
        assert!(post.excerpt.is_none());
    }

    #[tokio::test]
    async fn store_failure_is_retryable() {
        let (store, post_id, ctx) = seeded(FixedSummarizer::new("Short.")).await;
        store.set_fail_excerpt_updates(true);

        let err = process_summarization_job(&json!({"postId": post_id, "content": "x y z"}), &ctx)
            .await
            .expect_err("store down");
        assert!(matches!(err, JobError::StoreUpdate(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn deleted_post_completes_quietly() {
        let (store, post_id, ctx) = seeded(FixedSummarizer::new("Short.")).await;
        store.delete_post(post_id).await.expect("delete");

        process_summarization_job(&json!({"postId": post_id, "content": "x y z"}), &ctx)
            .await
            .expect("nothing left to enrich");
    }
}
