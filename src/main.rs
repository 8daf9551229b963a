use std::{process, sync::Arc};

use scriptorium::{
    application::{
        error::AppError,
        jobs::{
            JobQueue, JobWorkerContext, QueueMonitor, QueuePolicy, SummarizationWorker,
            enqueue_summarization_job,
        },
        repos::{PostsRepo, PostsWriteRepo},
    },
    config,
    infra::{
        db::{PostgresJobQueue, PostgresRepositories},
        error::InfraError,
        memory::{MemoryJobQueue, MemoryPostStore},
        summarizer::HttpSummarizer,
        telemetry,
    },
};
use tokio::sync::watch;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Health(_) => run_health(settings).await,
        config::Command::Jobs(args) => run_jobs(settings, args.command).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

/// Store and queue adapters selected by configuration.
struct Backends {
    reader: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    queue: Arc<dyn JobQueue>,
    database: Option<Arc<PostgresRepositories>>,
}

fn queue_policy(settings: &config::QueueSettings) -> QueuePolicy {
    let mut policy = QueuePolicy {
        max_attempts: settings.max_attempts.get(),
        failed_retention: settings.failed_retention,
        stalled_after: settings.stalled_after,
        ..QueuePolicy::default()
    };
    policy.backoff.initial = settings.backoff_initial;
    policy
}

async fn connect_database(
    settings: &config::Settings,
) -> Result<Option<PostgresRepositories>, AppError> {
    let Some(url) = settings.database.url.as_deref() else {
        return Ok(None);
    };

    let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    Ok(Some(PostgresRepositories::new(pool)))
}

async fn init_backends(settings: &config::Settings, migrate: bool) -> Result<Backends, AppError> {
    let policy = queue_policy(&settings.queue);

    match connect_database(settings).await? {
        Some(repositories) => {
            if migrate {
                PostgresRepositories::run_migrations(repositories.pool())
                    .await
                    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
            }
            let queue = PostgresJobQueue::new(&repositories, settings.queue.name.clone(), policy);
            let repositories = Arc::new(repositories);
            Ok(Backends {
                reader: repositories.clone(),
                writer: repositories.clone(),
                queue: Arc::new(queue),
                database: Some(repositories),
            })
        }
        None => {
            warn!(
                target = "scriptorium::bootstrap",
                "database.url is not configured; using in-memory adapters"
            );
            let store = Arc::new(MemoryPostStore::new());
            Ok(Backends {
                reader: store.clone(),
                writer: store,
                queue: Arc::new(MemoryJobQueue::new(settings.queue.name.clone(), policy)),
                database: None,
            })
        }
    }
}

fn build_monitor(queue: Arc<dyn JobQueue>, settings: &config::MonitorSettings) -> QueueMonitor {
    QueueMonitor::new(queue)
        .with_sample_interval(settings.sample_interval)
        .with_degraded_threshold(settings.degraded_failure_rate)
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let backends = init_backends(&settings, true).await?;
    let summarizer = HttpSummarizer::new(&settings.summarizer)?;

    let context = JobWorkerContext {
        posts: backends.writer.clone(),
        summarizer: Arc::new(summarizer),
    };
    let worker = SummarizationWorker::new(backends.queue.clone(), context)
        .with_poll_interval(settings.queue.poll_interval);
    let monitor = Arc::new(build_monitor(backends.queue.clone(), &settings.monitor));

    info!(
        target = "scriptorium::serve",
        queue = backends.queue.name(),
        worker_id = worker.worker_id(),
        postgres = backends.database.is_some(),
        "starting summarization worker"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_handle = monitor.clone().spawn(shutdown_rx.clone());
    let mut worker_handle = worker.spawn(shutdown_rx);

    wait_for_shutdown_signal().await;
    info!(
        target = "scriptorium::serve",
        grace_seconds = settings.worker.graceful_shutdown.as_secs(),
        "shutdown requested; draining in-flight job"
    );
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(settings.worker.graceful_shutdown, &mut worker_handle).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(
            target = "scriptorium::serve",
            error = %err,
            "worker task ended abnormally"
        ),
        Err(_) => {
            warn!(
                target = "scriptorium::serve",
                "graceful shutdown timed out; the in-flight job will be retried after it stalls"
            );
            worker_handle.abort();
        }
    }

    if let Err(err) = monitor_handle.await {
        error!(
            target = "scriptorium::serve",
            error = %err,
            "monitor task ended abnormally"
        );
    }

    let health = monitor.get_health().await;
    info!(
        target = "scriptorium::serve",
        status = ?health.status,
        processed = health.metrics.processed,
        failed = health.metrics.failed,
        "stopped"
    );
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(
                target = "scriptorium::serve",
                error = %err,
                "failed to listen for ctrl-c"
            );
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(
                    target = "scriptorium::serve",
                    error = %err,
                    "failed to listen for SIGTERM"
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn run_health(settings: config::Settings) -> Result<(), AppError> {
    let backends = init_backends(&settings, false).await?;
    let monitor = build_monitor(backends.queue.clone(), &settings.monitor);
    let report = monitor.status_report().await;

    let database = match backends.database.as_ref() {
        Some(repositories) => match repositories.health_check().await {
            Ok(()) => serde_json::json!({"configured": true, "connected": true}),
            Err(err) => serde_json::json!({
                "configured": true,
                "connected": false,
                "error": err.to_string(),
            }),
        },
        None => serde_json::json!({"configured": false, "connected": false}),
    };

    print_json(&serde_json::json!({
        "queue": backends.queue.name(),
        "health": report.health,
        "counts": report.counts,
        "failure_rate_observed": report.failure_rate_observed,
        "database": database,
    }))
}

async fn run_jobs(
    settings: config::Settings,
    command: config::JobsCommand,
) -> Result<(), AppError> {
    let backends = init_backends(&settings, false).await?;

    match command {
        config::JobsCommand::Failed => {
            let jobs = backends.queue.failed_jobs().await?;
            print_json(&jobs)
        }
        config::JobsCommand::Retry { post_id } => {
            let post = backends
                .reader
                .find_by_id(post_id)
                .await?
                .ok_or(AppError::NotFound)?;
            let outcome = enqueue_summarization_job(
                backends.queue.as_ref(),
                post.id,
                post.content,
                settings.queue.priority,
            )
            .await?;
            info!(
                target = "scriptorium::jobs",
                post_id = %post_id,
                outcome = ?outcome,
                "summarization re-enqueued"
            );
            Ok(())
        }
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = connect_database(&settings)
        .await?
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    PostgresRepositories::run_migrations(repositories.pool())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    info!(target = "scriptorium::migrate", "migrations applied");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
