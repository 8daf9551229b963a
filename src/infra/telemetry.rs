use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions with whichever metrics recorder is installed.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "scriptorium_jobs_completed_total",
            Unit::Count,
            "Summarization jobs that completed successfully."
        );
        describe_counter!(
            "scriptorium_jobs_failed_total",
            Unit::Count,
            "Summarization jobs moved to the failed set."
        );
        describe_counter!(
            "scriptorium_jobs_retried_total",
            Unit::Count,
            "Failed attempts that were scheduled for retry."
        );
        describe_gauge!(
            "scriptorium_queue_waiting",
            Unit::Count,
            "Jobs waiting to be picked up at the last sample."
        );
        describe_gauge!(
            "scriptorium_queue_active",
            Unit::Count,
            "Jobs being processed at the last sample."
        );
        describe_histogram!(
            "scriptorium_job_processing_ms",
            Unit::Milliseconds,
            "Wall time of successful summarization jobs."
        );
        describe_counter!(
            "scriptorium_listing_cache_hit_total",
            Unit::Count,
            "Listing requests served from cache."
        );
        describe_counter!(
            "scriptorium_listing_cache_miss_total",
            Unit::Count,
            "Listing requests that queried the store."
        );
        describe_counter!(
            "scriptorium_summarization_enqueue_failed_total",
            Unit::Count,
            "Post mutations whose summarization job could not be enqueued."
        );
    });
}
