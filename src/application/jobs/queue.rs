use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::domain::entities::JobRecord;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_secs(5);
pub const DEFAULT_FAILED_RETENTION: usize = 100;
pub const DEFAULT_STALLED_AFTER: Duration = Duration::from_secs(600);
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),
    #[error("queue backend error: {0}")]
    Backend(String),
    #[error("job payload could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Exponential backoff: `initial * 2^(attempt - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
}

impl BackoffPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial.saturating_mul(1 << exponent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePolicy {
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub failed_retention: usize,
    /// An active job whose lock is older than this is handed out again.
    pub stalled_after: Duration,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: BackoffPolicy {
                initial: DEFAULT_BACKOFF_INITIAL,
            },
            failed_retention: DEFAULT_FAILED_RETENTION,
            stalled_after: DEFAULT_STALLED_AFTER,
        }
    }
}

/// Lower priority values are served first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOptions {
    pub priority: i32,
    pub delay: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: String,
    pub payload: serde_json::Value,
    pub options: JobOptions,
}

/// A job handed to a worker. `attempt` is 1-based and already counts this run.
#[derive(Debug, Clone)]
pub struct ReservedJob {
    pub id: String,
    /// Identifies this reservation. Once the job is handed to another worker
    /// after a stall, completing or failing with this token changes nothing.
    pub lock_token: String,
    pub payload: serde_json::Value,
    pub attempt: u32,
    pub max_attempts: u32,
    pub enqueued_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// No job with this id existed.
    Created,
    /// A waiting, delayed, or failed job was replaced by the new payload.
    Refreshed,
    /// The job is running; the new payload runs once the current attempt ends.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// The job was pruned.
    Removed,
    /// A payload parked during the run was queued in its place.
    Requeued,
    /// The reservation no longer owns the job; nothing changed.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    Retrying { attempt: u32, delay: Duration },
    /// Moved to the failed set.
    Failed,
    /// A newer payload arrived while running; it was queued in place of a retry.
    Superseded,
    /// The reservation no longer owns the job; nothing changed.
    Stale,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Completed {
        job_id: String,
        duration: Duration,
    },
    Failed {
        job_id: String,
        reason: String,
        attempt: u32,
        will_retry: bool,
    },
}

/// In-process fan-out of job lifecycle events.
#[derive(Debug, Clone)]
pub struct JobEventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl Default for JobEventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }
}

impl JobEventBus {
    pub fn publish(&self, event: JobEvent) {
        // no subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

/// Named, keyed, at-least-once job queue.
///
/// A job id identifies at most one unit of work: enqueueing an id that is
/// already present refreshes it instead of creating a second job.
#[async_trait]
pub trait JobQueue: Send + Sync {
    fn name(&self) -> &str;

    fn policy(&self) -> &QueuePolicy;

    async fn enqueue(&self, job: NewJob) -> Result<EnqueueOutcome, QueueError>;

    /// Claim the next ready job, if any.
    async fn reserve(&self, worker: &str) -> Result<Option<ReservedJob>, QueueError>;

    /// Prune the job, or re-queue it when a newer payload arrived mid-run.
    async fn complete(
        &self,
        job: &ReservedJob,
        duration: Duration,
    ) -> Result<CompleteOutcome, QueueError>;

    /// Schedule a retry with backoff, or move the job to the failed set when
    /// the error is permanent or the attempt budget is spent.
    ///
    /// Both `complete` and `fail` are no-ops for a reservation whose lock was
    /// taken over after a stall.
    async fn fail(
        &self,
        job: &ReservedJob,
        reason: &str,
        retryable: bool,
    ) -> Result<FailOutcome, QueueError>;

    async fn counts(&self) -> Result<QueueCounts, QueueError>;

    /// Newest failures first, bounded by the retention policy.
    async fn failed_jobs(&self) -> Result<Vec<JobRecord>, QueueError>;

    async fn is_connected(&self) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<JobEvent>;
}

/// Whether a failed attempt should go to the failed set rather than retry.
pub fn is_final_attempt(policy: &QueuePolicy, attempt: u32, retryable: bool) -> bool {
    !retryable || attempt >= policy.max_attempts
}

/// Enqueue a job with the provided payload under a caller-chosen id.
pub async fn enqueue_job<Q, P>(
    queue: &Q,
    id: String,
    payload: &P,
    options: JobOptions,
) -> Result<EnqueueOutcome, QueueError>
where
    Q: JobQueue + ?Sized,
    P: Serialize,
{
    let payload = serde_json::to_value(payload)?;
    queue.enqueue(NewJob { id, payload, options }).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_five_seconds() {
        let backoff = QueuePolicy::default().backoff;
        assert_eq!(backoff.delay_for(1), Duration::from_secs(5));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(10));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(20));
    }

    #[test]
    fn permanent_errors_are_final_on_first_attempt() {
        let policy = QueuePolicy::default();
        assert!(is_final_attempt(&policy, 1, false));
        assert!(!is_final_attempt(&policy, 1, true));
        assert!(!is_final_attempt(&policy, 2, true));
        assert!(is_final_attempt(&policy, 3, true));
    }

    #[tokio::test]
    async fn event_bus_delivers_to_late_subscribers_only_new_events() {
        let bus = JobEventBus::default();
        bus.publish(JobEvent::Completed {
            job_id: "before".into(),
            duration: Duration::ZERO,
        });

        let mut rx = bus.subscribe();
        bus.publish(JobEvent::Completed {
            job_id: "after".into(),
            duration: Duration::from_millis(3),
        });

        match rx.recv().await.expect("event") {
            JobEvent::Completed { job_id, .. } => assert_eq!(job_id, "after"),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
