use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clipflow_api::config::ServerConfig;
use clipflow_api::router::build_app_router;
use clipflow_api::state::AppState;
use clipflow_cloud::{S3BlobConfig, S3BlobStorage};
use clipflow_core::annotation_tool::CliAnnotationTool;
use clipflow_core::config::PipelineConfig;
use clipflow_core::ffmpeg::FfmpegMediaTool;
use clipflow_db::{PgClipStore, PgJobQueue, PgKvStore, PgVideoStore};
use clipflow_pipeline::PipelineContext;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipflow_api=debug,tower_http=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("invalid server configuration")?;
    let pipeline = PipelineConfig::from_env().context("invalid pipeline configuration")?;
    tracing::info!(host = %config.host, port = config.port, "Loaded server configuration");

    // --- Database ---
    let pool = clipflow_db::create_pool(&config.database_url)
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
    // Media and annotation tools are only invoked by the worker; the API
    // needs them to complete the context.
    let blobs = S3BlobStorage::new(S3BlobConfig::from_env(pipeline.storage_account.clone())).await;
    let annotation = CliAnnotationTool::new(pipeline.annotation_tool.clone());
    let ctx = PipelineContext {
        config: Arc::new(pipeline),
        videos: Arc::new(PgVideoStore::new(pool.clone())),
        clips: Arc::new(PgClipStore::new(pool.clone())),
        kv: Arc::new(PgKvStore::new(pool.clone())),
        blobs: Arc::new(blobs),
        media: Arc::new(FfmpegMediaTool::default()),
        annotation: Arc::new(annotation),
        queue: Arc::new(PgJobQueue::new(pool.clone(), config.job_max_attempts)),
    };

    let state = AppState {
        ctx,
        jwt: Arc::new(config.jwt.clone()),
    };
    let app = build_app_router(
        state,
        &config.cors_origins,
        Duration::from_secs(config.request_timeout_secs),
    );

    // --- Start server ---
    let host = config.host.parse().context("invalid HOST address")?;
    let addr = SocketAddr::new(host, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
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

    tracing::info!("Shutdown signal received");
}
