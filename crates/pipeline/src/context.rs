//! Wiring of collaborators into the pipeline services, and the job
//! dispatcher used by workers.

use std::sync::Arc;

use clipflow_core::annotation_tool::AnnotationTool;
use clipflow_core::blob::BlobStorage;
use clipflow_core::config::PipelineConfig;
use clipflow_core::error::CoreError;
use clipflow_core::lock::ExpiringKvStore;
use clipflow_core::media::MediaTool;
use clipflow_core::queue::{JobQueue, PipelineJob};
use clipflow_core::video::{ClipStore, VideoStore};
use tracing::Instrument;

use crate::batch::BatchOrchestrator;
use crate::extraction::ClipExtractor;
use crate::ingest::IngestJob;
use crate::lock_service::LockService;
use crate::recovery::MaintenanceSweep;
use crate::workflow::VideoWorkflow;

/// Every external dependency of the pipeline behind its trait.
///
/// Cheap to clone; services built from it share the same stores.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    pub videos: Arc<dyn VideoStore>,
    pub clips: Arc<dyn ClipStore>,
    pub kv: Arc<dyn ExpiringKvStore>,
    pub blobs: Arc<dyn BlobStorage>,
    pub media: Arc<dyn MediaTool>,
    pub annotation: Arc<dyn AnnotationTool>,
    pub queue: Arc<dyn JobQueue>,
}

impl PipelineContext {
    pub fn locks(&self) -> LockService {
        LockService::new(Arc::clone(&self.kv), self.config.lock_ttl)
    }

    pub fn workflow(&self) -> VideoWorkflow {
        VideoWorkflow::new(
            Arc::clone(&self.config),
            Arc::clone(&self.videos),
            Arc::clone(&self.clips),
            self.locks(),
            Arc::clone(&self.blobs),
            Arc::clone(&self.queue),
        )
    }

    pub fn ingest(&self) -> IngestJob {
        IngestJob::new(
            Arc::clone(&self.config),
            Arc::clone(&self.videos),
            Arc::clone(&self.blobs),
            Arc::clone(&self.media),
        )
    }

    pub fn extractor(&self) -> ClipExtractor {
        ClipExtractor::new(
            Arc::clone(&self.config),
            Arc::clone(&self.videos),
            Arc::clone(&self.clips),
            Arc::clone(&self.blobs),
            Arc::clone(&self.media),
            Arc::clone(&self.annotation),
        )
    }

    pub fn orchestrator(&self) -> BatchOrchestrator {
        BatchOrchestrator::new(
            Arc::clone(&self.config),
            Arc::clone(&self.videos),
            Arc::clone(&self.clips),
            Arc::new(self.extractor()),
        )
    }

    pub fn sweep(&self) -> MaintenanceSweep {
        MaintenanceSweep::new(Arc::clone(&self.videos), self.locks(), self.workflow())
    }

    /// Run one queued job to completion and return its JSON result.
    ///
    /// Domain failures (a broken download, failed clips) are part of the
    /// result; `Err` means the job itself could not run and may be retried.
    pub async fn execute(&self, job: &PipelineJob) -> Result<serde_json::Value, CoreError> {
        let span = tracing::info_span!("job", kind = job.name());
        async {
            match job {
                PipelineJob::IngestVideo { video_id } => to_json(&self.ingest().run(*video_id).await?),
                PipelineJob::ExtractClips { video_id } => {
                    to_json(&self.orchestrator().run(*video_id).await?)
                }
                PipelineJob::MaintenanceSweep => to_json(&self.sweep().run().await),
            }
        }
        .instrument(span)
        .await
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, CoreError> {
    serde_json::to_value(value).map_err(|e| CoreError::Internal(format!("job result encoding: {e}")))
}
