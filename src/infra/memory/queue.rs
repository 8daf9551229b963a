use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

use crate::application::jobs::{
    CompleteOutcome, EnqueueOutcome, FailOutcome, JobEvent, JobEventBus, JobQueue, NewJob,
    QueueCounts, QueueError, QueuePolicy, ReservedJob, is_final_attempt,
};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::entities::JobRecord;
use crate::domain::types::JobState;

const SOURCE: &str = "infra::memory::queue";

struct StoredJob {
    payload: serde_json::Value,
    pending_payload: Option<serde_json::Value>,
    state: JobState,
    attempts: u32,
    priority: i32,
    seq: u64,
    enqueued_at: OffsetDateTime,
    run_at: Instant,
    lock_at: Option<Instant>,
    lock_token: Option<String>,
    last_error: Option<String>,
    failed_at: Option<OffsetDateTime>,
}

impl StoredJob {
    fn fresh(payload: serde_json::Value, priority: i32, delay: Duration, seq: u64) -> Self {
        Self {
            payload,
            pending_payload: None,
            state: if delay.is_zero() {
                JobState::Waiting
            } else {
                JobState::Delayed
            },
            attempts: 0,
            priority,
            seq,
            enqueued_at: OffsetDateTime::now_utc(),
            run_at: Instant::now() + delay,
            lock_at: None,
            lock_token: None,
            last_error: None,
            failed_at: None,
        }
    }

    fn is_ready(&self, now: Instant, stalled_after: Duration) -> bool {
        match self.state {
            JobState::Waiting | JobState::Delayed => self.run_at <= now,
            JobState::Active => self
                .lock_at
                .is_some_and(|locked| now.saturating_duration_since(locked) >= stalled_after),
            JobState::Failed => false,
        }
    }
}

#[derive(Default)]
struct State {
    jobs: HashMap<String, StoredJob>,
    next_seq: u64,
}

impl State {
    fn seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn owned_by(&self, id: &str, token: &str) -> bool {
        self.jobs.get(id).is_some_and(|job| {
            job.state == JobState::Active && job.lock_token.as_deref() == Some(token)
        })
    }

    /// Replace an active job with its parked payload. Returns false if none was parked.
    fn promote_pending(&mut self, id: &str) -> bool {
        let seq = self.seq();
        let Some(job) = self.jobs.get_mut(id) else {
            return false;
        };
        let Some(payload) = job.pending_payload.take() else {
            return false;
        };
        *job = StoredJob::fresh(payload, job.priority, Duration::ZERO, seq);
        true
    }

    fn prune_failed(&mut self, retention: usize) {
        let mut failed: Vec<(OffsetDateTime, u64, String)> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.state == JobState::Failed)
            .map(|(id, job)| (job.failed_at.unwrap_or(job.enqueued_at), job.seq, id.clone()))
            .collect();
        if failed.len() <= retention {
            return;
        }
        failed.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        for (_, _, id) in failed.into_iter().skip(retention) {
            self.jobs.remove(&id);
        }
    }
}

/// Keyed job queue held in process memory.
pub struct MemoryJobQueue {
    name: String,
    policy: QueuePolicy,
    state: RwLock<State>,
    events: JobEventBus,
    available: AtomicBool,
}

impl MemoryJobQueue {
    pub fn new(name: impl Into<String>, policy: QueuePolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            state: RwLock::new(State::default()),
            events: JobEventBus::default(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the broker connection.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Snapshot of one job, whatever its state.
    pub fn job(&self, id: &str) -> Option<JobRecord> {
        let state = rw_read(&self.state, SOURCE, "job");
        state.jobs.get(id).map(|job| self.record(id, job))
    }

    fn ensure_available(&self) -> Result<(), QueueError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QueueError::Unavailable(format!(
                "queue `{}` is not reachable",
                self.name
            )))
        }
    }

    fn record(&self, id: &str, job: &StoredJob) -> JobRecord {
        let until_run = job.run_at.saturating_duration_since(Instant::now());
        JobRecord {
            id: id.to_string(),
            queue: self.name.clone(),
            payload: job.payload.clone(),
            state: job.state,
            attempts: job.attempts,
            max_attempts: self.policy.max_attempts,
            priority: job.priority,
            enqueued_at: job.enqueued_at,
            run_at: OffsetDateTime::now_utc() + until_run,
            last_error: job.last_error.clone(),
            failed_at: job.failed_at,
        }
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    async fn enqueue(&self, job: NewJob) -> Result<EnqueueOutcome, QueueError> {
        self.ensure_available()?;
        let delay = job.options.delay.unwrap_or(Duration::ZERO);
        let mut state = rw_write(&self.state, SOURCE, "enqueue");
        let seq = state.seq();

        let outcome = match state.jobs.get_mut(&job.id) {
            Some(existing) if existing.state == JobState::Active => {
                existing.pending_payload = Some(job.payload);
                existing.priority = job.options.priority;
                EnqueueOutcome::Deferred
            }
            Some(existing) => {
                *existing = StoredJob::fresh(job.payload, job.options.priority, delay, seq);
                EnqueueOutcome::Refreshed
            }
            None => {
                state.jobs.insert(
                    job.id,
                    StoredJob::fresh(job.payload, job.options.priority, delay, seq),
                );
                EnqueueOutcome::Created
            }
        };
        Ok(outcome)
    }

    async fn reserve(&self, worker: &str) -> Result<Option<ReservedJob>, QueueError> {
        self.ensure_available()?;
        let now = Instant::now();
        let mut state = rw_write(&self.state, SOURCE, "reserve");

        let next = state
            .jobs
            .iter()
            .filter(|(_, job)| job.is_ready(now, self.policy.stalled_after))
            .min_by(|(_, a), (_, b)| {
                a.priority
                    .cmp(&b.priority)
                    .then(a.run_at.cmp(&b.run_at))
                    .then(a.seq.cmp(&b.seq))
            })
            .map(|(id, _)| id.clone());

        let Some(id) = next else {
            return Ok(None);
        };
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };
        let lock_token = format!("{worker}:{}", Uuid::new_v4());
        job.state = JobState::Active;
        job.attempts += 1;
        job.lock_at = Some(now);
        job.lock_token = Some(lock_token.clone());

        Ok(Some(ReservedJob {
            id,
            lock_token,
            payload: job.payload.clone(),
            attempt: job.attempts,
            max_attempts: self.policy.max_attempts,
            enqueued_at: job.enqueued_at,
        }))
    }

    async fn complete(
        &self,
        job: &ReservedJob,
        duration: Duration,
    ) -> Result<CompleteOutcome, QueueError> {
        self.ensure_available()?;
        let outcome = {
            let mut state = rw_write(&self.state, SOURCE, "complete");
            if !state.owned_by(&job.id, &job.lock_token) {
                return Ok(CompleteOutcome::Stale);
            }
            if state.promote_pending(&job.id) {
                CompleteOutcome::Requeued
            } else {
                state.jobs.remove(&job.id);
                CompleteOutcome::Removed
            }
        };

        self.events.publish(JobEvent::Completed {
            job_id: job.id.clone(),
            duration,
        });
        Ok(outcome)
    }

    async fn fail(
        &self,
        job: &ReservedJob,
        reason: &str,
        retryable: bool,
    ) -> Result<FailOutcome, QueueError> {
        self.ensure_available()?;
        let outcome = {
            let mut state = rw_write(&self.state, SOURCE, "fail");
            if !state.owned_by(&job.id, &job.lock_token) {
                return Ok(FailOutcome::Stale);
            }
            if state.promote_pending(&job.id) {
                FailOutcome::Superseded
            } else if is_final_attempt(&self.policy, job.attempt, retryable) {
                if let Some(stored) = state.jobs.get_mut(&job.id) {
                    stored.state = JobState::Failed;
                    stored.lock_at = None;
                    stored.lock_token = None;
                    stored.last_error = Some(reason.to_string());
                    stored.failed_at = Some(OffsetDateTime::now_utc());
                }
                state.prune_failed(self.policy.failed_retention);
                FailOutcome::Failed
            } else {
                let delay = self.policy.backoff.delay_for(job.attempt);
                if let Some(stored) = state.jobs.get_mut(&job.id) {
                    stored.state = JobState::Delayed;
                    stored.lock_at = None;
                    stored.lock_token = None;
                    stored.last_error = Some(reason.to_string());
                    stored.run_at = Instant::now() + delay;
                }
                FailOutcome::Retrying {
                    attempt: job.attempt,
                    delay,
                }
            }
        };

        self.events.publish(JobEvent::Failed {
            job_id: job.id.clone(),
            reason: reason.to_string(),
            attempt: job.attempt,
            will_retry: !matches!(outcome, FailOutcome::Failed),
        });
        Ok(outcome)
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        self.ensure_available()?;
        let state = rw_read(&self.state, SOURCE, "counts");
        let mut counts = QueueCounts::default();
        for job in state.jobs.values() {
            match job.state {
                JobState::Waiting => counts.waiting += 1,
                JobState::Delayed => counts.delayed += 1,
                JobState::Active => counts.active += 1,
                JobState::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn failed_jobs(&self) -> Result<Vec<JobRecord>, QueueError> {
        self.ensure_available()?;
        let state = rw_read(&self.state, SOURCE, "failed_jobs");
        let mut failed: Vec<(&String, &StoredJob)> = state
            .jobs
            .iter()
            .filter(|(_, job)| job.state == JobState::Failed)
            .collect();
        failed.sort_by(|(_, a), (_, b)| b.failed_at.cmp(&a.failed_at).then(b.seq.cmp(&a.seq)));
        Ok(failed
            .into_iter()
            .take(self.policy.failed_retention)
            .map(|(id, job)| self.record(id, job))
            .collect())
    }

    async fn is_connected(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::jobs::JobOptions;

    fn queue() -> MemoryJobQueue {
        MemoryJobQueue::new("summarization", QueuePolicy::default())
    }

    fn job(id: &str, payload: serde_json::Value) -> NewJob {
        NewJob {
            id: id.to_string(),
            payload,
            options: JobOptions::default(),
        }
    }

    #[tokio::test]
    async fn same_id_collapses_into_one_job() {
        let queue = queue();
        assert_eq!(
            queue.enqueue(job("a", json!(1))).await.expect("enqueue"),
            EnqueueOutcome::Created
        );
        assert_eq!(
            queue.enqueue(job("a", json!(2))).await.expect("enqueue"),
            EnqueueOutcome::Refreshed
        );

        let counts = queue.counts().await.expect("counts");
        assert_eq!(counts.waiting, 1);

        let reserved = queue.reserve("w").await.expect("reserve").expect("job");
        assert_eq!(reserved.payload, json!(2));
        assert!(queue.reserve("w").await.expect("reserve").is_none());
    }

    #[tokio::test]
    async fn enqueue_while_active_runs_after_current_attempt() {
        let queue = queue();
        queue.enqueue(job("a", json!("old"))).await.expect("enqueue");
        let running = queue.reserve("w").await.expect("reserve").expect("job");

        assert_eq!(
            queue.enqueue(job("a", json!("new"))).await.expect("enqueue"),
            EnqueueOutcome::Deferred
        );
        // still only one runnable occurrence
        assert!(queue.reserve("w").await.expect("reserve").is_none());

        assert_eq!(
            queue
                .complete(&running, Duration::from_millis(1))
                .await
                .expect("complete"),
            CompleteOutcome::Requeued
        );
        let next = queue.reserve("w").await.expect("reserve").expect("job");
        assert_eq!(next.payload, json!("new"));
        assert_eq!(next.attempt, 1);
    }

    #[tokio::test]
    async fn lower_priority_number_runs_first() {
        let queue = queue();
        queue.enqueue(job("late", json!(0))).await.expect("enqueue");
        queue
            .enqueue(NewJob {
                options: JobOptions {
                    priority: -1,
                    delay: None,
                },
                ..job("urgent", json!(0))
            })
            .await
            .expect("enqueue");

        let first = queue.reserve("w").await.expect("reserve").expect("job");
        assert_eq!(first.id, "urgent");
    }

    #[tokio::test]
    async fn failed_set_is_bounded() {
        let queue = MemoryJobQueue::new(
            "summarization",
            QueuePolicy {
                failed_retention: 2,
                ..QueuePolicy::default()
            },
        );
        for id in ["a", "b", "c"] {
            queue.enqueue(job(id, json!(id))).await.expect("enqueue");
            let reserved = queue.reserve("w").await.expect("reserve").expect("job");
            let outcome = queue
                .fail(&reserved, "bad payload", false)
                .await
                .expect("fail");
            assert_eq!(outcome, FailOutcome::Failed);
        }

        let failed = queue.failed_jobs().await.expect("failed");
        let ids: Vec<&str> = failed.iter().map(|job| job.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(failed[0].last_error.as_deref(), Some("bad payload"));
    }

    #[tokio::test]
    async fn failed_job_is_revived_by_enqueue() {
        let queue = queue();
        queue.enqueue(job("a", json!(1))).await.expect("enqueue");
        let reserved = queue.reserve("w").await.expect("reserve").expect("job");
        queue.fail(&reserved, "boom", false).await.expect("fail");

        assert_eq!(
            queue.enqueue(job("a", json!(2))).await.expect("enqueue"),
            EnqueueOutcome::Refreshed
        );
        let counts = queue.counts().await.expect("counts");
        assert_eq!((counts.waiting, counts.failed), (1, 0));
    }

    #[tokio::test]
    async fn unavailable_queue_rejects_enqueue() {
        let queue = queue();
        queue.set_available(false);
        assert!(matches!(
            queue.enqueue(job("a", json!(1))).await,
            Err(QueueError::Unavailable(_))
        ));
        assert!(!queue.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_active_job_is_handed_out_again() {
        let queue = MemoryJobQueue::new(
            "summarization",
            QueuePolicy {
                stalled_after: Duration::from_secs(30),
                ..QueuePolicy::default()
            },
        );
        queue.enqueue(job("a", json!(1))).await.expect("enqueue");
        queue.reserve("w1").await.expect("reserve").expect("job");
        assert!(queue.reserve("w2").await.expect("reserve").is_none());

        tokio::time::advance(Duration::from_secs(31)).await;
        let again = queue.reserve("w2").await.expect("reserve").expect("job");
        assert_eq!(again.attempt, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_worker_cannot_settle_a_job_taken_over_after_a_stall() {
        let queue = queue();
        queue.enqueue(job("a", json!(1))).await.expect("enqueue");
        let slow = queue.reserve("w1").await.expect("reserve").expect("job");

        tokio::time::advance(Duration::from_secs(601)).await;
        let current = queue.reserve("w2").await.expect("reserve").expect("job");
        assert_ne!(slow.lock_token, current.lock_token);

        assert_eq!(
            queue
                .complete(&slow, Duration::from_millis(1))
                .await
                .expect("complete"),
            CompleteOutcome::Stale
        );
        assert_eq!(
            queue.fail(&slow, "late", true).await.expect("fail"),
            FailOutcome::Stale
        );
        let stored = queue.job("a").expect("job still present");
        assert_eq!(stored.state, JobState::Active);

        assert_eq!(
            queue.fail(&current, "boom", true).await.expect("fail"),
            FailOutcome::Retrying {
                attempt: 2,
                delay: Duration::from_secs(10),
            }
        );
        let stored = queue.job("a").expect("job still present");
        assert_eq!(stored.state, JobState::Delayed);
        assert_eq!(stored.last_error.as_deref(), Some("boom"));

        assert_eq!(
            queue
                .complete(&current, Duration::from_millis(1))
                .await
                .expect("complete"),
            CompleteOutcome::Stale
        );
        assert!(queue.job("a").is_some());
    }
}
