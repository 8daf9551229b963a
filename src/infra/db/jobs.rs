//! Durable keyed job queue on a single `queue_jobs` table.
//!
//! `(queue, id)` is the primary key, so collapsing is an upsert. Workers
//! claim rows with `FOR UPDATE SKIP LOCKED`; a payload that arrives while a
//! row is active parks in `pending_payload` and replaces the job once the
//! running attempt ends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use time::OffsetDateTime;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::application::jobs::{
    CompleteOutcome, EnqueueOutcome, FailOutcome, JobEvent, JobEventBus, JobQueue, NewJob,
    QueueCounts, QueueError, QueuePolicy, ReservedJob, is_final_attempt,
};
use crate::domain::entities::JobRecord;
use crate::domain::types::JobState;

use super::PostgresRepositories;
use super::util::map_queue_error;

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    queue: String,
    payload: serde_json::Value,
    state: String,
    attempts: i32,
    max_attempts: i32,
    priority: i32,
    enqueued_at: OffsetDateTime,
    run_at: OffsetDateTime,
    last_error: Option<String>,
    failed_at: Option<OffsetDateTime>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = QueueError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let state = JobState::try_from(row.state.as_str())
            .map_err(|_| QueueError::Backend(format!("unknown job state `{}`", row.state)))?;

        Ok(Self {
            id: row.id,
            queue: row.queue,
            payload: row.payload,
            state,
            attempts: u32::try_from(row.attempts).unwrap_or_default(),
            max_attempts: u32::try_from(row.max_attempts).unwrap_or_default(),
            priority: row.priority,
            enqueued_at: row.enqueued_at,
            run_at: row.run_at,
            last_error: row.last_error,
            failed_at: row.failed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReservedRow {
    id: String,
    payload: serde_json::Value,
    attempts: i32,
    max_attempts: i32,
    enqueued_at: OffsetDateTime,
}

pub struct PostgresJobQueue {
    pool: Arc<PgPool>,
    name: String,
    policy: QueuePolicy,
    events: JobEventBus,
}

impl PostgresJobQueue {
    pub fn new(
        repositories: &PostgresRepositories,
        name: impl Into<String>,
        policy: QueuePolicy,
    ) -> Self {
        Self {
            pool: repositories.shared_pool(),
            name: name.into(),
            policy,
            events: JobEventBus::default(),
        }
    }

    fn seconds(duration: Duration) -> f64 {
        duration.as_secs_f64()
    }

    fn max_attempts_param(&self) -> i32 {
        i32::try_from(self.policy.max_attempts).unwrap_or(i32::MAX)
    }

    async fn requeue_pending(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        queue: &str,
        id: &str,
    ) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE queue_jobs \
                SET payload = pending_payload, pending_payload = NULL, state = 'waiting', \
                    attempts = 0, enqueued_at = now(), run_at = now(), \
                    lock_by = NULL, lock_at = NULL, last_error = NULL, failed_at = NULL \
              WHERE queue = $1 AND id = $2",
        )
        .bind(queue)
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(map_queue_error)?;
        Ok(())
    }

    /// Lock the row if `job` still holds it. `None` means the reservation is stale.
    async fn lock_owned(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        queue: &str,
        job: &ReservedJob,
    ) -> Result<Option<Option<serde_json::Value>>, QueueError> {
        sqlx::query_scalar(
            "SELECT pending_payload FROM queue_jobs \
              WHERE queue = $1 AND id = $2 AND state = 'active' AND lock_by = $3 \
              FOR UPDATE",
        )
        .bind(queue)
        .bind(&job.id)
        .bind(&job.lock_token)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_queue_error)
    }
}

#[async_trait]
impl JobQueue for PostgresJobQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn policy(&self) -> &QueuePolicy {
        &self.policy
    }

    async fn enqueue(&self, job: NewJob) -> Result<EnqueueOutcome, QueueError> {
        let delay = job.options.delay.unwrap_or(Duration::ZERO);
        let state = if delay.is_zero() {
            JobState::Waiting
        } else {
            JobState::Delayed
        };

        let (inserted, state): (bool, String) = sqlx::query_as(
            "INSERT INTO queue_jobs (queue, id, payload, state, attempts, max_attempts, priority, \
                                     enqueued_at, run_at) \
             VALUES ($1, $2, $3, $4, 0, $5, $6, now(), now() + make_interval(secs => $7)) \
             ON CONFLICT (queue, id) DO UPDATE SET \
                 pending_payload = CASE WHEN queue_jobs.state = 'active' \
                                        THEN EXCLUDED.payload ELSE NULL END, \
                 payload = CASE WHEN queue_jobs.state = 'active' \
                                THEN queue_jobs.payload ELSE EXCLUDED.payload END, \
                 state = CASE WHEN queue_jobs.state = 'active' \
                              THEN queue_jobs.state ELSE EXCLUDED.state END, \
                 attempts = CASE WHEN queue_jobs.state = 'active' \
                                 THEN queue_jobs.attempts ELSE 0 END, \
                 enqueued_at = CASE WHEN queue_jobs.state = 'active' \
                                    THEN queue_jobs.enqueued_at ELSE now() END, \
                 run_at = CASE WHEN queue_jobs.state = 'active' \
                               THEN queue_jobs.run_at ELSE EXCLUDED.run_at END, \
                 last_error = CASE WHEN queue_jobs.state = 'active' \
                                   THEN queue_jobs.last_error ELSE NULL END, \
                 failed_at = NULL, \
                 max_attempts = EXCLUDED.max_attempts, \
                 priority = EXCLUDED.priority \
             RETURNING (xmax = 0) AS inserted, state",
        )
        .bind(&self.name)
        .bind(&job.id)
        .bind(&job.payload)
        .bind(state.as_str())
        .bind(self.max_attempts_param())
        .bind(job.options.priority)
        .bind(Self::seconds(delay))
        .fetch_one(self.pool.as_ref())
        .await
        .map_err(map_queue_error)?;

        Ok(if inserted {
            EnqueueOutcome::Created
        } else if state == JobState::Active.as_str() {
            EnqueueOutcome::Deferred
        } else {
            EnqueueOutcome::Refreshed
        })
    }

    async fn reserve(&self, worker: &str) -> Result<Option<ReservedJob>, QueueError> {
        let lock_token = format!("{worker}:{}", Uuid::new_v4());
        let row: Option<ReservedRow> = sqlx::query_as(
            "UPDATE queue_jobs \
                SET state = 'active', attempts = attempts + 1, lock_by = $2, lock_at = now() \
              WHERE (queue, id) = ( \
                    SELECT queue, id FROM queue_jobs \
                     WHERE queue = $1 \
                       AND ((state IN ('waiting', 'delayed') AND run_at <= now()) \
                            OR (state = 'active' \
                                AND lock_at < now() - make_interval(secs => $3))) \
                     ORDER BY priority ASC, run_at ASC, enqueued_at ASC \
                     LIMIT 1 \
                     FOR UPDATE SKIP LOCKED) \
              RETURNING id, payload, attempts, max_attempts, enqueued_at",
        )
        .bind(&self.name)
        .bind(&lock_token)
        .bind(Self::seconds(self.policy.stalled_after))
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(map_queue_error)?;

        Ok(row.map(|row| ReservedJob {
            id: row.id,
            lock_token,
            payload: row.payload,
            attempt: u32::try_from(row.attempts).unwrap_or_default(),
            max_attempts: u32::try_from(row.max_attempts).unwrap_or_default(),
            enqueued_at: row.enqueued_at,
        }))
    }

    async fn complete(
        &self,
        job: &ReservedJob,
        duration: Duration,
    ) -> Result<CompleteOutcome, QueueError> {
        let mut tx = self.pool.begin().await.map_err(map_queue_error)?;
        let outcome = match Self::lock_owned(&mut tx, &self.name, job).await? {
            Some(Some(_)) => {
                Self::requeue_pending(&mut tx, &self.name, &job.id).await?;
                CompleteOutcome::Requeued
            }
            Some(None) => {
                sqlx::query("DELETE FROM queue_jobs WHERE queue = $1 AND id = $2")
                    .bind(&self.name)
                    .bind(&job.id)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_queue_error)?;
                CompleteOutcome::Removed
            }
            None => CompleteOutcome::Stale,
        };
        tx.commit().await.map_err(map_queue_error)?;

        if outcome != CompleteOutcome::Stale {
            self.events.publish(JobEvent::Completed {
                job_id: job.id.clone(),
                duration,
            });
        }
        Ok(outcome)
    }

    async fn fail(
        &self,
        job: &ReservedJob,
        reason: &str,
        retryable: bool,
    ) -> Result<FailOutcome, QueueError> {
        let mut tx = self.pool.begin().await.map_err(map_queue_error)?;
        let Some(pending) = Self::lock_owned(&mut tx, &self.name, job).await? else {
            tx.commit().await.map_err(map_queue_error)?;
            return Ok(FailOutcome::Stale);
        };

        let outcome = if pending.is_some() {
            Self::requeue_pending(&mut tx, &self.name, &job.id).await?;
            FailOutcome::Superseded
        } else if is_final_attempt(&self.policy, job.attempt, retryable) {
            sqlx::query(
                "UPDATE queue_jobs \
                    SET state = 'failed', last_error = $3, failed_at = now(), \
                        lock_by = NULL, lock_at = NULL \
                  WHERE queue = $1 AND id = $2",
            )
            .bind(&self.name)
            .bind(&job.id)
            .bind(reason)
            .execute(&mut *tx)
            .await
            .map_err(map_queue_error)?;

            sqlx::query(
                "DELETE FROM queue_jobs \
                  WHERE queue = $1 AND state = 'failed' AND id NOT IN ( \
                        SELECT id FROM queue_jobs \
                         WHERE queue = $1 AND state = 'failed' \
                         ORDER BY failed_at DESC, id \
                         LIMIT $2)",
            )
            .bind(&self.name)
            .bind(i64::try_from(self.policy.failed_retention).unwrap_or(i64::MAX))
            .execute(&mut *tx)
            .await
            .map_err(map_queue_error)?;

            FailOutcome::Failed
        } else {
            let delay = self.policy.backoff.delay_for(job.attempt);
            sqlx::query(
                "UPDATE queue_jobs \
                    SET state = 'delayed', last_error = $3, \
                        run_at = now() + make_interval(secs => $4), \
                        lock_by = NULL, lock_at = NULL \
                  WHERE queue = $1 AND id = $2",
            )
            .bind(&self.name)
            .bind(&job.id)
            .bind(reason)
            .bind(Self::seconds(delay))
            .execute(&mut *tx)
            .await
            .map_err(map_queue_error)?;

            FailOutcome::Retrying {
                attempt: job.attempt,
                delay,
            }
        };
        tx.commit().await.map_err(map_queue_error)?;

        self.events.publish(JobEvent::Failed {
            job_id: job.id.clone(),
            reason: reason.to_string(),
            attempt: job.attempt,
            will_retry: !matches!(outcome, FailOutcome::Failed),
        });
        Ok(outcome)
    }

    async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT state, COUNT(*) FROM queue_jobs WHERE queue = $1 GROUP BY state",
        )
        .bind(&self.name)
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(map_queue_error)?;

        let mut counts = QueueCounts::default();
        for (state, count) in rows {
            let count = u64::try_from(count).unwrap_or_default();
            match JobState::try_from(state.as_str()) {
                Ok(JobState::Waiting) => counts.waiting = count,
                Ok(JobState::Delayed) => counts.delayed = count,
                Ok(JobState::Active) => counts.active = count,
                Ok(JobState::Failed) => counts.failed = count,
                Err(()) => {
                    return Err(QueueError::Backend(format!("unknown job state `{state}`")));
                }
            }
        }
        Ok(counts)
    }

    async fn failed_jobs(&self) -> Result<Vec<JobRecord>, QueueError> {
        let rows: Vec<JobRow> = sqlx::query_as(
            "SELECT id, queue, payload, state, attempts, max_attempts, priority, \
                    enqueued_at, run_at, last_error, failed_at \
               FROM queue_jobs \
              WHERE queue = $1 AND state = 'failed' \
              ORDER BY failed_at DESC, id \
              LIMIT $2",
        )
        .bind(&self.name)
        .bind(i64::try_from(self.policy.failed_retention).unwrap_or(i64::MAX))
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(map_queue_error)?;

        rows.into_iter().map(JobRecord::try_from).collect()
    }

    async fn is_connected(&self) -> bool {
        sqlx::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await
            .is_ok()
    }

    fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }
}
