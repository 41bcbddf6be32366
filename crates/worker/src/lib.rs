//! Background worker: executes queued pipeline jobs and schedules the
//! periodic maintenance sweep.

pub mod config;
pub mod runner;
pub mod scheduler;

use std::sync::Arc;

use clipflow_cloud::{S3BlobConfig, S3BlobStorage};
use clipflow_core::annotation_tool::CliAnnotationTool;
use clipflow_core::config::PipelineConfig;
use clipflow_core::ffmpeg::FfmpegMediaTool;
use clipflow_db::{DbPool, PgClipStore, PgJobQueue, PgKvStore, PgVideoStore};
use clipflow_pipeline::PipelineContext;

use crate::config::WorkerConfig;

/// Wire Postgres stores, S3 blob storage, ffmpeg and the annotation CLI into
/// a pipeline context.
pub async fn build_context(
    pool: &DbPool,
    pipeline: PipelineConfig,
    worker: &WorkerConfig,
) -> PipelineContext {
    let blobs = S3BlobStorage::new(S3BlobConfig::from_env(pipeline.storage_account.clone())).await;
    let annotation = CliAnnotationTool::new(pipeline.annotation_tool.clone());

    PipelineContext {
        config: Arc::new(pipeline),
        videos: Arc::new(PgVideoStore::new(pool.clone())),
        clips: Arc::new(PgClipStore::new(pool.clone())),
        kv: Arc::new(PgKvStore::new(pool.clone())),
        blobs: Arc::new(blobs),
        media: Arc::new(FfmpegMediaTool::new(&worker.ffmpeg_bin, &worker.ffprobe_bin)),
        annotation: Arc::new(annotation),
        queue: Arc::new(PgJobQueue::new(pool.clone(), worker.max_attempts)),
    }
}
