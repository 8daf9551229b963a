//! Queue health sampling and job counters.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::queue::{JobEvent, JobQueue, QueueCounts};

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(60);
/// Failure rate above which a connected queue reports `degraded`.
pub const DEFAULT_DEGRADED_FAILURE_RATE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    /// Jobs that completed successfully.
    pub processed: u64,
    /// Jobs that reached the failed set.
    pub failed: u64,
    pub retried: u64,
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub last_processing_ms: u64,
}

impl MonitorSnapshot {
    /// `failed / processed`, or 0.0 before anything has completed.
    pub fn failure_rate(&self) -> f64 {
        match self.processed {
            0 => 0.0,
            processed => self.failed as f64 / processed as f64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueHealth {
    pub status: HealthStatus,
    pub connected: bool,
    pub failure_rate: f64,
    pub metrics: MonitorSnapshot,
}

/// Health plus queue depth, as printed by the `health` command.
///
/// Processed and failed counters only exist in the process that observes job
/// events. A fresh process reports `failure_rate_observed: false`, and the
/// retained failures are visible through `counts.failed` instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueStatusReport {
    pub health: QueueHealth,
    pub counts: Option<QueueCounts>,
    pub failure_rate_observed: bool,
}

pub fn determine_health(connected: bool, failure_rate: f64, degraded_above: f64) -> HealthStatus {
    if !connected {
        HealthStatus::Unhealthy
    } else if failure_rate > degraded_above {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
    waiting: AtomicU64,
    active: AtomicU64,
    delayed: AtomicU64,
    last_processing_ms: AtomicU64,
}

pub struct QueueMonitor {
    queue: Arc<dyn JobQueue>,
    counters: Counters,
    sample_interval: Duration,
    degraded_above: f64,
}

impl QueueMonitor {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self {
            queue,
            counters: Counters::default(),
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            degraded_above: DEFAULT_DEGRADED_FAILURE_RATE,
        }
    }

    pub fn with_sample_interval(mut self, sample_interval: Duration) -> Self {
        self.sample_interval = sample_interval;
        self
    }

    pub fn with_degraded_threshold(mut self, degraded_above: f64) -> Self {
        self.degraded_above = degraded_above;
        self
    }

    /// Fold one lifecycle event into the counters.
    pub fn observe(&self, event: &JobEvent) {
        match event {
            JobEvent::Completed { job_id, duration } => {
                let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .last_processing_ms
                    .store(millis, Ordering::Relaxed);
                counter!("scriptorium_jobs_completed_total").increment(1);
                histogram!("scriptorium_job_processing_ms").record(millis as f64);
                debug!(
                    target = "application::jobs::monitor",
                    job_id = %job_id,
                    elapsed_ms = millis,
                    "job completed"
                );
            }
            JobEvent::Failed {
                job_id,
                reason,
                attempt,
                will_retry,
            } => {
                if *will_retry {
                    self.counters.retried.fetch_add(1, Ordering::Relaxed);
                    counter!("scriptorium_jobs_retried_total").increment(1);
                } else {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    counter!("scriptorium_jobs_failed_total").increment(1);
                }
                debug!(
                    target = "application::jobs::monitor",
                    job_id = %job_id,
                    attempt,
                    will_retry,
                    reason = %reason,
                    "job failed"
                );
            }
        }
    }

    /// Refresh the queue-depth gauges from the backend.
    pub async fn sample(&self) -> Option<QueueCounts> {
        match self.queue.counts().await {
            Ok(counts) => {
                self.counters.waiting.store(counts.waiting, Ordering::Relaxed);
                self.counters.active.store(counts.active, Ordering::Relaxed);
                self.counters.delayed.store(counts.delayed, Ordering::Relaxed);
                gauge!("scriptorium_queue_waiting").set(counts.waiting as f64);
                gauge!("scriptorium_queue_active").set(counts.active as f64);
                info!(
                    target = "application::jobs::monitor",
                    queue = self.queue.name(),
                    waiting = counts.waiting,
                    active = counts.active,
                    delayed = counts.delayed,
                    failed = counts.failed,
                    processed = self.counters.processed.load(Ordering::Relaxed),
                    "queue_metrics"
                );
                Some(counts)
            }
            Err(err) => {
                warn!(
                    target = "application::jobs::monitor",
                    error = %err,
                    "failed to sample queue counts"
                );
                None
            }
        }
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            processed: self.counters.processed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            retried: self.counters.retried.load(Ordering::Relaxed),
            waiting: self.counters.waiting.load(Ordering::Relaxed),
            active: self.counters.active.load(Ordering::Relaxed),
            delayed: self.counters.delayed.load(Ordering::Relaxed),
            last_processing_ms: self.counters.last_processing_ms.load(Ordering::Relaxed),
        }
    }

    pub async fn get_health(&self) -> QueueHealth {
        let connected = self.queue.is_connected().await;
        let metrics = self.snapshot();
        let failure_rate = metrics.failure_rate();
        QueueHealth {
            status: determine_health(connected, failure_rate, self.degraded_above),
            connected,
            failure_rate,
            metrics,
        }
    }

    pub async fn status_report(&self) -> QueueStatusReport {
        let counts = self.sample().await;
        let health = self.get_health().await;
        let failure_rate_observed = health.metrics.processed + health.metrics.failed > 0;
        QueueStatusReport {
            health,
            counts,
            failure_rate_observed,
        }
    }

    /// Subscribe to queue events and sample depth on an interval until
    /// `shutdown` flips to true.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        // subscribe before spawning so no event between here and the first poll is lost
        let mut events = self.queue.subscribe();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.sample_interval);
            loop {
                tokio::select! {
                    received = events.recv() => match received {
                        Ok(event) => self.observe(&event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => warn!(
                            target = "application::jobs::monitor",
                            skipped,
                            "monitor lagged behind job events"
                        ),
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = interval.tick() => {
                        self.sample().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}
