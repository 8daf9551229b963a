//! Background enrichment: the keyed job queue, the summarization handler, its
//! worker loop, and the queue monitor.

mod context;
mod monitor;
mod queue;
mod summarize;
mod worker;

pub use context::{JobError, JobWorkerContext};
pub use monitor::{
    DEFAULT_DEGRADED_FAILURE_RATE, DEFAULT_SAMPLE_INTERVAL, HealthStatus, MonitorSnapshot,
    QueueHealth, QueueMonitor, QueueStatusReport, determine_health,
};
pub use queue::{
    BackoffPolicy, CompleteOutcome, DEFAULT_BACKOFF_INITIAL, DEFAULT_FAILED_RETENTION,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_STALLED_AFTER, EnqueueOutcome, FailOutcome, JobEvent,
    JobEventBus, JobOptions, JobQueue, NewJob, QueueCounts, QueueError, QueuePolicy, ReservedJob,
    enqueue_job, is_final_attempt,
};
pub use summarize::{
    SUMMARIZATION_JOB_PREFIX, SummarizationJobPayload, enqueue_summarization_job,
    process_summarization_job, summarization_job_id,
};
pub use worker::{DEFAULT_POLL_INTERVAL, SummarizationWorker, WorkerStep};
