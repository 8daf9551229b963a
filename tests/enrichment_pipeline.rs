use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use scriptorium::application::jobs::{
    EnqueueOutcome, FailOutcome, JobQueue, JobWorkerContext, QueuePolicy, SummarizationWorker,
    WorkerStep, summarization_job_id,
};
use scriptorium::application::posts::{
    CreatePostCommand, Enrichment, PostError, PostService, UpdatePostCommand,
};
use scriptorium::application::repos::PostsRepo;
use scriptorium::application::summarizer::{Summarizer, SummarizerError};
use scriptorium::domain::types::{JobState, PostStatus};
use scriptorium::infra::memory::{MemoryJobQueue, MemoryPostStore};
use uuid::Uuid;

struct CountingSummarizer {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingSummarizer {
    fn ok() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for CountingSummarizer {
    async fn summarize(&self, text: &str) -> Result<String, SummarizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SummarizerError::Request("connection refused".into()));
        }
        let words = text.split_whitespace().count();
        Ok(format!("A summary of {words} words."))
    }
}

struct Harness {
    store: Arc<MemoryPostStore>,
    queue: Arc<MemoryJobQueue>,
    posts: PostService,
    worker: SummarizationWorker,
}

fn harness(summarizer: Arc<CountingSummarizer>) -> Harness {
    let store = Arc::new(MemoryPostStore::new());
    let queue = Arc::new(MemoryJobQueue::new(
        "post-summarization",
        QueuePolicy::default(),
    ));
    let posts = PostService::new(store.clone(), store.clone(), store.clone(), queue.clone());
    let worker = SummarizationWorker::new(
        queue.clone(),
        JobWorkerContext {
            posts: store.clone(),
            summarizer,
        },
    );
    Harness {
        store,
        queue,
        posts,
        worker,
    }
}

fn words(n: usize) -> String {
    (0..n)
        .map(|i| format!("word{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn draft(author_id: Uuid, title: &str, content: String) -> CreatePostCommand {
    CreatePostCommand {
        author_id,
        title: title.to_string(),
        content,
        status: PostStatus::Published,
        tags: vec!["intro".to_string()],
        featured_image: None,
        excerpt: None,
    }
}

#[tokio::test]
async fn create_edit_cycle_regenerates_excerpt_only_on_large_changes() {
    let summarizer = CountingSummarizer::ok();
    let h = harness(summarizer.clone());
    let author = Uuid::new_v4();

    let first = h
        .posts
        .create_post(draft(author, "Hello World", words(10)))
        .await
        .expect("create first");
    assert_eq!(first.post.slug, "hello-world");
    assert_eq!(first.post.reading_time, 1);
    assert_eq!(
        first.enrichment,
        Enrichment::Scheduled(EnqueueOutcome::Created)
    );

    let second = h
        .posts
        .create_post(draft(author, "Hello World", words(12)))
        .await
        .expect("create second");
    assert_eq!(second.post.slug, "hello-world-1");

    assert_eq!(h.worker.run_once().await.expect("run"), WorkerStep::Completed);
    assert_eq!(h.worker.run_once().await.expect("run"), WorkerStep::Completed);
    assert_eq!(h.worker.run_once().await.expect("run"), WorkerStep::Idle);

    let stored = h
        .store
        .find_by_id(first.post.id)
        .await
        .expect("find")
        .expect("post");
    assert_eq!(stored.excerpt.as_deref(), Some("A summary of 10 words."));

    let grown = h
        .posts
        .update_post(
            author,
            UpdatePostCommand {
                id: first.post.id,
                content: Some(words(80)),
                ..UpdatePostCommand::default()
            },
        )
        .await
        .expect("grow to 80 words");
    assert!(matches!(grown.enrichment, Enrichment::Scheduled(_)));
    assert_eq!(grown.post.slug, "hello-world");
    assert_eq!(h.worker.run_once().await.expect("run"), WorkerStep::Completed);

    let stored = h
        .store
        .find_by_id(first.post.id)
        .await
        .expect("find")
        .expect("post");
    assert_eq!(stored.excerpt.as_deref(), Some("A summary of 80 words."));

    let tweaked = h
        .posts
        .update_post(
            author,
            UpdatePostCommand {
                id: first.post.id,
                content: Some(words(90)),
                ..UpdatePostCommand::default()
            },
        )
        .await
        .expect("grow to 90 words");
    assert_eq!(tweaked.enrichment, Enrichment::NotNeeded);
    assert_eq!(h.worker.run_once().await.expect("run"), WorkerStep::Idle);
    assert_eq!(summarizer.calls(), 3);
}

#[tokio::test]
async fn author_supplied_excerpt_skips_summarization() {
    let summarizer = CountingSummarizer::ok();
    let h = harness(summarizer.clone());

    let mut command = draft(Uuid::new_v4(), "Handwritten", words(20));
    command.excerpt = Some("Written by hand.".into());
    let created = h.posts.create_post(command).await.expect("create");

    assert_eq!(created.enrichment, Enrichment::NotNeeded);
    assert_eq!(created.post.excerpt.as_deref(), Some("Written by hand."));
    assert_eq!(h.worker.run_once().await.expect("run"), WorkerStep::Idle);
    assert_eq!(summarizer.calls(), 0);
}

#[tokio::test]
async fn repeated_edits_collapse_into_one_job() {
    let summarizer = CountingSummarizer::ok();
    let h = harness(summarizer.clone());
    let author = Uuid::new_v4();

    let created = h
        .posts
        .create_post(draft(author, "Drafty", words(10)))
        .await
        .expect("create");

    let edited = h
        .posts
        .update_post(
            author,
            UpdatePostCommand {
                id: created.post.id,
                content: Some(words(15)),
                ..UpdatePostCommand::default()
            },
        )
        .await
        .expect("edit");
    assert_eq!(
        edited.enrichment,
        Enrichment::Scheduled(EnqueueOutcome::Refreshed)
    );

    assert_eq!(h.worker.run_once().await.expect("run"), WorkerStep::Completed);
    assert_eq!(h.worker.run_once().await.expect("run"), WorkerStep::Idle);

    let stored = h
        .store
        .find_by_id(created.post.id)
        .await
        .expect("find")
        .expect("post");
    assert_eq!(stored.excerpt.as_deref(), Some("A summary of 15 words."));
    assert_eq!(summarizer.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failing_summarizer_backs_off_then_lands_in_failed_set() {
    let summarizer = CountingSummarizer::failing();
    let h = harness(summarizer.clone());

    let created = h
        .posts
        .create_post(draft(Uuid::new_v4(), "Unlucky", words(30)))
        .await
        .expect("create");

    assert_eq!(
        h.worker.run_once().await.expect("run"),
        WorkerStep::Failed(FailOutcome::Retrying {
            attempt: 1,
            delay: Duration::from_secs(5),
        })
    );
    assert_eq!(h.worker.run_once().await.expect("run"), WorkerStep::Idle);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(
        h.worker.run_once().await.expect("run"),
        WorkerStep::Failed(FailOutcome::Retrying {
            attempt: 2,
            delay: Duration::from_secs(10),
        })
    );

    tokio::time::advance(Duration::from_secs(9)).await;
    assert_eq!(h.worker.run_once().await.expect("run"), WorkerStep::Idle);
    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(
        h.worker.run_once().await.expect("run"),
        WorkerStep::Failed(FailOutcome::Failed)
    );

    tokio::time::advance(Duration::from_secs(60)).await;
    assert_eq!(h.worker.run_once().await.expect("run"), WorkerStep::Idle);
    assert_eq!(summarizer.calls(), 3);

    let failed = h.queue.failed_jobs().await.expect("failed jobs");
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, summarization_job_id(created.post.id));
    assert_eq!(failed[0].state, JobState::Failed);
    assert_eq!(failed[0].attempts, 3);
    assert!(
        failed[0]
            .last_error
            .as_deref()
            .is_some_and(|err| err.contains("connection refused"))
    );

    let stored = h
        .store
        .find_by_id(created.post.id)
        .await
        .expect("find")
        .expect("post");
    assert!(stored.excerpt.is_none());
}

#[tokio::test]
async fn queue_outage_does_not_block_the_write() {
    let h = harness(CountingSummarizer::ok());
    h.queue.set_available(false);

    let created = h
        .posts
        .create_post(draft(Uuid::new_v4(), "Offline queue", words(10)))
        .await
        .expect("create despite queue outage");
    assert_eq!(created.enrichment, Enrichment::Unavailable);
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn only_the_author_may_edit_or_delete() {
    let h = harness(CountingSummarizer::ok());
    let author = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let created = h
        .posts
        .create_post(draft(author, "Mine", words(10)))
        .await
        .expect("create");

    let err = h
        .posts
        .update_post(
            stranger,
            UpdatePostCommand {
                id: created.post.id,
                title: Some("Theirs".into()),
                ..UpdatePostCommand::default()
            },
        )
        .await
        .expect_err("stranger edit");
    assert!(matches!(err, PostError::Forbidden { user_id } if user_id == stranger));

    let err = h
        .posts
        .delete_post(stranger, created.post.id)
        .await
        .expect_err("stranger delete");
    assert!(matches!(err, PostError::Forbidden { .. }));

    h.posts
        .delete_post(author, created.post.id)
        .await
        .expect("author delete");
    assert!(matches!(
        h.posts.find_by_id(created.post.id).await,
        Err(PostError::NotFound)
    ));
}

#[tokio::test]
async fn retitling_moves_the_slug_and_invalid_input_is_rejected() {
    let h = harness(CountingSummarizer::ok());
    let author = Uuid::new_v4();

    let created = h
        .posts
        .create_post(draft(author, "First Title", words(10)))
        .await
        .expect("create");

    let renamed = h
        .posts
        .update_post(
            author,
            UpdatePostCommand {
                id: created.post.id,
                title: Some("Second Title!".into()),
                ..UpdatePostCommand::default()
            },
        )
        .await
        .expect("rename");
    assert_eq!(renamed.post.slug, "second-title");
    assert_eq!(renamed.enrichment, Enrichment::NotNeeded);

    let err = h
        .posts
        .create_post(draft(author, "No", words(10)))
        .await
        .expect_err("short title");
    assert!(matches!(err, PostError::Validation(_)));

    let err = h
        .posts
        .create_post(draft(author, "Tiny body", "too short".into()))
        .await
        .expect_err("short content");
    assert!(matches!(err, PostError::Validation(_)));

    let err = h
        .posts
        .create_post(draft(author, "Blank body", " ".repeat(40)))
        .await
        .expect_err("whitespace content");
    assert!(matches!(err, PostError::Validation(_)));
}
