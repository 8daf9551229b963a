use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use uuid::Uuid;

/// Command-line arguments for the Scriptorium binary.
#[derive(Debug, Parser)]
#[command(
    name = "scriptorium",
    version,
    about = "Blog enrichment worker and listing cache"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "SCRIPTORIUM_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the summarization worker and queue monitor.
    Serve(Box<ServeArgs>),
    /// Print queue health as JSON.
    Health(HealthArgs),
    /// Inspect or retry summarization jobs.
    Jobs(JobsArgs),
    /// Apply database migrations.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the summarization queue name.
    #[arg(long = "queue-name", value_name = "NAME")]
    pub queue_name: Option<String>,

    /// Override how often an idle worker polls the queue.
    #[arg(long = "queue-poll-interval-ms", value_name = "MS")]
    pub queue_poll_interval_ms: Option<u64>,

    /// Override the listing cache capacity.
    #[arg(long = "cache-capacity", value_name = "COUNT")]
    pub cache_capacity: Option<usize>,

    /// Override the listing cache entry lifetime.
    #[arg(long = "cache-listing-ttl-seconds", value_name = "SECONDS")]
    pub cache_listing_ttl_seconds: Option<u64>,

    /// Override the summarizer endpoint.
    #[arg(long = "summarizer-endpoint", value_name = "URL")]
    pub summarizer_endpoint: Option<String>,

    /// Override the summarizer request timeout.
    #[arg(long = "summarizer-timeout-seconds", value_name = "SECONDS")]
    pub summarizer_timeout_seconds: Option<u64>,

    /// Override how long shutdown waits for the in-flight job.
    #[arg(long = "worker-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub worker_graceful_shutdown_seconds: Option<u64>,

    /// Override the queue depth sampling interval.
    #[arg(long = "monitor-sample-interval-seconds", value_name = "SECONDS")]
    pub monitor_sample_interval_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct HealthArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Clone)]
pub struct JobsArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(subcommand)]
    pub command: JobsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum JobsCommand {
    /// List retained failed jobs, newest first.
    Failed,
    /// Re-enqueue summarization for a post from its current content.
    Retry {
        #[arg(value_name = "POST_ID")]
        post_id: Uuid,
    },
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}
