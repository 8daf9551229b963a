//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroU64},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

mod cli;

pub use cli::{
    CliArgs, Command, DatabaseOverride, HealthArgs, JobsArgs, JobsCommand, MigrateArgs,
    ServeArgs, ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "scriptorium";
const ENV_PREFIX: &str = "SCRIPTORIUM";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_QUEUE_NAME: &str = "post-summarization";
const DEFAULT_QUEUE_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_QUEUE_BACKOFF_INITIAL_MS: u64 = 5_000;
const DEFAULT_QUEUE_FAILED_RETENTION: usize = 100;
const DEFAULT_QUEUE_POLL_INTERVAL_MS: u64 = 500;
const DEFAULT_QUEUE_STALLED_AFTER_SECS: u64 = 600;
const DEFAULT_CACHE_CAPACITY: usize = 1_000;
const DEFAULT_CACHE_LISTING_TTL_SECS: u64 = 600;
const DEFAULT_SUMMARIZER_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/sshleifer/distilbart-cnn-12-6";
const DEFAULT_SUMMARIZER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SUMMARIZER_MAX_LENGTH: u32 = 100;
const DEFAULT_SUMMARIZER_MIN_LENGTH: u32 = 50;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_MONITOR_SAMPLE_INTERVAL_SECS: u64 = 60;
const DEFAULT_MONITOR_DEGRADED_FAILURE_RATE: f64 = 0.1;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub queue: QueueSettings,
    pub cache: CacheSettings,
    pub summarizer: SummarizerSettings,
    pub worker: WorkerSettings,
    pub monitor: MonitorSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Without a URL the binary runs on in-memory adapters.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub name: String,
    pub max_attempts: NonZeroU32,
    pub backoff_initial: Duration,
    pub failed_retention: usize,
    pub poll_interval: Duration,
    pub stalled_after: Duration,
    /// Lower runs first.
    pub priority: i32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub capacity: usize,
    pub listing_ttl_seconds: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    pub endpoint: Url,
    pub api_token: Option<String>,
    pub timeout_seconds: NonZeroU64,
    pub max_length: u32,
    pub min_length: u32,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub sample_interval: Duration,
    pub degraded_failure_rate: f64,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Health(args)) => raw.apply_database_override(&args.database),
        Some(Command::Jobs(args)) => raw.apply_database_override(&args.database),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    queue: RawQueueSettings,
    cache: RawCacheSettings,
    summarizer: RawSummarizerSettings,
    worker: RawWorkerSettings,
    monitor: RawMonitorSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(count) = overrides.database_max_connections {
            self.database.max_connections = Some(count);
        }
        if let Some(name) = overrides.queue_name.as_ref() {
            self.queue.name = Some(name.clone());
        }
        if let Some(ms) = overrides.queue_poll_interval_ms {
            self.queue.poll_interval_ms = Some(ms);
        }
        if let Some(capacity) = overrides.cache_capacity {
            self.cache.capacity = Some(capacity);
        }
        if let Some(seconds) = overrides.cache_listing_ttl_seconds {
            self.cache.listing_ttl_seconds = Some(seconds);
        }
        if let Some(endpoint) = overrides.summarizer_endpoint.as_ref() {
            self.summarizer.endpoint = Some(endpoint.clone());
        }
        if let Some(seconds) = overrides.summarizer_timeout_seconds {
            self.summarizer.timeout_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.worker_graceful_shutdown_seconds {
            self.worker.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.monitor_sample_interval_seconds {
            self.monitor.sample_interval_seconds = Some(seconds);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            queue,
            cache,
            summarizer,
            worker,
            monitor,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            queue: build_queue_settings(queue)?,
            cache: build_cache_settings(cache)?,
            summarizer: build_summarizer_settings(summarizer)?,
            worker: build_worker_settings(worker)?,
            monitor: build_monitor_settings(monitor)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url,
        max_connections: non_zero_u32(max_connections.into(), "database.max_connections")?,
    })
}

fn build_queue_settings(queue: RawQueueSettings) -> Result<QueueSettings, LoadError> {
    let name = non_blank(queue.name).unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string());
    let max_attempts = queue.max_attempts.unwrap_or(DEFAULT_QUEUE_MAX_ATTEMPTS);
    let backoff_ms = queue
        .backoff_initial_ms
        .unwrap_or(DEFAULT_QUEUE_BACKOFF_INITIAL_MS);
    let poll_ms = queue
        .poll_interval_ms
        .unwrap_or(DEFAULT_QUEUE_POLL_INTERVAL_MS);
    let stalled_secs = queue
        .stalled_after_seconds
        .unwrap_or(DEFAULT_QUEUE_STALLED_AFTER_SECS);

    Ok(QueueSettings {
        name,
        max_attempts: non_zero_u32(max_attempts.into(), "queue.max_attempts")?,
        backoff_initial: Duration::from_millis(
            non_zero_u64(backoff_ms, "queue.backoff_initial_ms")?.get(),
        ),
        failed_retention: queue
            .failed_retention
            .unwrap_or(DEFAULT_QUEUE_FAILED_RETENTION),
        poll_interval: Duration::from_millis(
            non_zero_u64(poll_ms, "queue.poll_interval_ms")?.get(),
        ),
        stalled_after: Duration::from_secs(
            non_zero_u64(stalled_secs, "queue.stalled_after_seconds")?.get(),
        ),
        priority: queue.priority.unwrap_or(0),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let capacity = cache.capacity.unwrap_or(DEFAULT_CACHE_CAPACITY);
    if capacity == 0 {
        return Err(LoadError::invalid(
            "cache.capacity",
            "must be greater than zero",
        ));
    }
    let ttl = cache
        .listing_ttl_seconds
        .unwrap_or(DEFAULT_CACHE_LISTING_TTL_SECS);

    Ok(CacheSettings {
        capacity,
        listing_ttl_seconds: non_zero_u64(ttl, "cache.listing_ttl_seconds")?,
    })
}

fn build_summarizer_settings(
    summarizer: RawSummarizerSettings,
) -> Result<SummarizerSettings, LoadError> {
    let endpoint = non_blank(summarizer.endpoint)
        .unwrap_or_else(|| DEFAULT_SUMMARIZER_ENDPOINT.to_string());
    let endpoint = Url::parse(&endpoint)
        .map_err(|err| LoadError::invalid("summarizer.endpoint", format!("invalid url: {err}")))?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(LoadError::invalid(
            "summarizer.endpoint",
            "scheme must be http or https",
        ));
    }

    let timeout = summarizer
        .timeout_seconds
        .unwrap_or(DEFAULT_SUMMARIZER_TIMEOUT_SECS);
    let max_length = summarizer
        .max_length
        .unwrap_or(DEFAULT_SUMMARIZER_MAX_LENGTH);
    let min_length = summarizer
        .min_length
        .unwrap_or(DEFAULT_SUMMARIZER_MIN_LENGTH);
    if min_length > max_length {
        return Err(LoadError::invalid(
            "summarizer.min_length",
            format!("must not exceed max_length ({max_length})"),
        ));
    }

    Ok(SummarizerSettings {
        endpoint,
        api_token: non_blank(summarizer.api_token),
        timeout_seconds: non_zero_u64(timeout, "summarizer.timeout_seconds")?,
        max_length,
        min_length,
    })
}

fn build_worker_settings(worker: RawWorkerSettings) -> Result<WorkerSettings, LoadError> {
    let graceful_secs = worker
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    let graceful_secs = non_zero_u64(graceful_secs, "worker.graceful_shutdown_seconds")?;

    Ok(WorkerSettings {
        graceful_shutdown: Duration::from_secs(graceful_secs.get()),
    })
}

fn build_monitor_settings(monitor: RawMonitorSettings) -> Result<MonitorSettings, LoadError> {
    let interval = monitor
        .sample_interval_seconds
        .unwrap_or(DEFAULT_MONITOR_SAMPLE_INTERVAL_SECS);
    let rate = monitor
        .degraded_failure_rate
        .unwrap_or(DEFAULT_MONITOR_DEGRADED_FAILURE_RATE);
    if !(0.0..=1.0).contains(&rate) {
        return Err(LoadError::invalid(
            "monitor.degraded_failure_rate",
            "must be between 0 and 1",
        ));
    }

    Ok(MonitorSettings {
        sample_interval: Duration::from_secs(
            non_zero_u64(interval, "monitor.sample_interval_seconds")?.get(),
        ),
        degraded_failure_rate: rate,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawQueueSettings {
    name: Option<String>,
    max_attempts: Option<u32>,
    backoff_initial_ms: Option<u64>,
    failed_retention: Option<usize>,
    poll_interval_ms: Option<u64>,
    stalled_after_seconds: Option<u64>,
    priority: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    capacity: Option<usize>,
    listing_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSummarizerSettings {
    endpoint: Option<String>,
    api_token: Option<String>,
    timeout_seconds: Option<u64>,
    max_length: Option<u32>,
    min_length: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWorkerSettings {
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMonitorSettings {
    sample_interval_seconds: Option<u64>,
    degraded_failure_rate: Option<f64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_u64(value: u64, key: &'static str) -> Result<NonZeroU64, LoadError> {
    NonZeroU64::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
