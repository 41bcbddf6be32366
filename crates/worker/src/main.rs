use std::sync::Arc;

use anyhow::Context;
use clipflow_core::config::PipelineConfig;
use clipflow_db::PgKvStore;
use clipflow_worker::config::WorkerConfig;
use clipflow_worker::runner::JobRunner;
use clipflow_worker::scheduler::SweepScheduler;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipflow_worker=debug,clipflow_pipeline=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    // --- Configuration ---

    let worker = Arc::new(WorkerConfig::from_env().context("invalid worker configuration")?);
    let pipeline = PipelineConfig::from_env().context("invalid pipeline configuration")?;
    let sweep_interval = pipeline.sweep_interval;

    // --- Database ---
    let pool = clipflow_db::create_pool(&worker.database_url)
        .await
        .context("failed to connect to database")?;
    clipflow_db::health_check(&pool)
        .await
        .context("database health check failed")?;
    clipflow_db::run_migrations(&pool)
        .await
        .context("failed to run migrations")?;
    tracing::info!("Database ready");

    // --- Pipeline ---
    let ctx = clipflow_worker::build_context(&pool, pipeline, &worker).await;
    let cancel = CancellationToken::new();

    let runner = Arc::new(JobRunner::new(pool.clone(), ctx.clone(), worker.clone()));
    let scheduler = SweepScheduler::new(
        ctx.kv.clone(),
        ctx.queue.clone(),
        sweep_interval,
        worker.worker_name.clone(),
    );

    let housekeeping = {
        let runner = runner.clone();
        let cancel = cancel.clone();
        let kv = PgKvStore::new(pool.clone());
        tokio::spawn(async move { runner.housekeeping(kv, cancel).await })
    };
    let scheduling = {
        let cancel = cancel.clone();
        let poll = worker.housekeeping_interval;
        tokio::spawn(async move { scheduler.run(poll, cancel).await })
    };
    let jobs = {
        let runner = runner.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { runner.run(cancel).await })
    };

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, draining running jobs");
    cancel.cancel();

    let _ = tokio::join!(jobs, housekeeping, scheduling);
    pool.close().await;
    tracing::info!("Worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
