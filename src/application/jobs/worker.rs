//! Single-concurrency consumer for the summarization queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::context::JobWorkerContext;
use super::queue::{CompleteOutcome, FailOutcome, JobQueue, QueueError};
use super::summarize::process_summarization_job;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// What a single `run_once` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStep {
    Idle,
    Completed,
    Failed(FailOutcome),
    /// The job was taken over by another worker after a stall; this run's
    /// result was dropped.
    Stale,
}

pub struct SummarizationWorker {
    queue: Arc<dyn JobQueue>,
    context: JobWorkerContext,
    worker_id: String,
    poll_interval: Duration,
}

impl SummarizationWorker {
    pub fn new(queue: Arc<dyn JobQueue>, context: JobWorkerContext) -> Self {
        Self {
            queue,
            context,
            worker_id: format!("summarize-worker-{}", uuid::Uuid::new_v4()),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Reserve and process at most one job.
    pub async fn run_once(&self) -> Result<WorkerStep, QueueError> {
        let Some(job) = self.queue.reserve(&self.worker_id).await? else {
            return Ok(WorkerStep::Idle);
        };

        let started = Instant::now();
        let result = process_summarization_job(&job.payload, &self.context).await;
        let elapsed = started.elapsed();

        match result {
            Ok(()) => {
                if self.queue.complete(&job, elapsed).await? == CompleteOutcome::Stale {
                    warn!(
                        target = "application::jobs::worker",
                        job_id = %job.id,
                        attempt = job.attempt,
                        "job lock was taken over before completion"
                    );
                    return Ok(WorkerStep::Stale);
                }
                info!(
                    target = "application::jobs::worker",
                    job_id = %job.id,
                    attempt = job.attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "job completed"
                );
                Ok(WorkerStep::Completed)
            }
            Err(err) => {
                let reason = err.to_string();
                let outcome = self
                    .queue
                    .fail(&job, &reason, err.is_retryable())
                    .await?;
                match outcome {
                    FailOutcome::Retrying { attempt, delay } => warn!(
                        target = "application::jobs::worker",
                        job_id = %job.id,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %reason,
                        "job failed; retry scheduled"
                    ),
                    FailOutcome::Failed => error!(
                        target = "application::jobs::worker",
                        job_id = %job.id,
                        attempt = job.attempt,
                        error = %reason,
                        "job failed permanently"
                    ),
                    FailOutcome::Superseded => info!(
                        target = "application::jobs::worker",
                        job_id = %job.id,
                        error = %reason,
                        "job failed but newer content is queued"
                    ),
                    FailOutcome::Stale => {
                        warn!(
                            target = "application::jobs::worker",
                            job_id = %job.id,
                            attempt = job.attempt,
                            error = %reason,
                            "job lock was taken over before the failure was recorded"
                        );
                        return Ok(WorkerStep::Stale);
                    }
                }
                Ok(WorkerStep::Failed(outcome))
            }
        }
    }

    /// Poll until `shutdown` flips to true. An in-flight job always finishes
    /// before the loop observes the signal.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            target = "application::jobs::worker",
            worker_id = %self.worker_id,
            queue = self.queue.name(),
            "worker started"
        );

        while !*shutdown.borrow() {
            let idle = match self.run_once().await {
                Ok(WorkerStep::Idle) => true,
                Ok(_) => false,
                Err(err) => {
                    warn!(
                        target = "application::jobs::worker",
                        error = %err,
                        "queue operation failed"
                    );
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target = "application::jobs::worker",
            worker_id = %self.worker_id,
            "worker stopped"
        );
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
