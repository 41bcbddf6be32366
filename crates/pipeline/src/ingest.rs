//! Background ingest of a freshly registered video: download, convert, probe.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clipflow_core::blob::BlobStorage;
use clipflow_core::config::PipelineConfig;
use clipflow_core::error::CoreError;
use clipflow_core::media::MediaTool;
use clipflow_core::status::VideoStatus;
use clipflow_core::storage_path::{download_path, local_media_path};
use clipflow_core::types::DbId;
use clipflow_core::video::{SourceVideo, VideoStore, VideoUpdate};
use serde::Serialize;

/// What an ingest run did. Download and conversion failures are recorded on
/// the video and reported here; only infrastructure errors are `Err`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Ready { video_id: DbId, duration_secs: f64 },
    Failed { video_id: DbId, error: String },
    /// The video was no longer `downloading` (redelivered job).
    Skipped { video_id: DbId, status: VideoStatus },
}

pub struct IngestJob {
    config: Arc<PipelineConfig>,
    videos: Arc<dyn VideoStore>,
    blobs: Arc<dyn BlobStorage>,
    media: Arc<dyn MediaTool>,
}

impl IngestJob {
    pub fn new(
        config: Arc<PipelineConfig>,
        videos: Arc<dyn VideoStore>,
        blobs: Arc<dyn BlobStorage>,
        media: Arc<dyn MediaTool>,
    ) -> Self {
        Self {
            config,
            videos,
            blobs,
            media,
        }
    }

    pub async fn run(&self, video_id: DbId) -> Result<IngestOutcome, CoreError> {
        let video = self
            .videos
            .get_by_id(video_id)
            .await?
            .ok_or_else(|| CoreError::not_found("SourceVideo", video_id))?;

        if video.status != VideoStatus::Downloading {
            tracing::info!(video_id, status = video.status.as_str(), "Ingest skipped");
            return Ok(IngestOutcome::Skipped {
                video_id,
                status: video.status,
            });
        }

        let raw = download_path(&self.config.media_root, &video.storage_path);
        let result = self.prepare(&video, &raw).await;
        remove_quietly(&raw).await;

        match result {
            Ok(update) => {
                let duration_secs = update.duration_secs.unwrap_or_default();
                video.status.ensure_transition(VideoStatus::NotAnnotated)?;
                self.videos.update_fields(video_id, &update).await?;
                tracing::info!(video_id, duration_secs, "Video ready for annotation");
                Ok(IngestOutcome::Ready {
                    video_id,
                    duration_secs,
                })
            }
            Err(error) => {
                tracing::error!(video_id, error = %error, "Video ingest failed");
                self.videos
                    .update_fields(video_id, &VideoUpdate::status(VideoStatus::DownloadError))
                    .await?;
                Ok(IngestOutcome::Failed { video_id, error })
            }
        }
    }

    /// Download and convert, returning the update that marks the video ready.
    async fn prepare(&self, video: &SourceVideo, raw: &Path) -> Result<VideoUpdate, String> {
        tokio::fs::create_dir_all(&self.config.media_root)
            .await
            .map_err(|e| format!("cannot create media directory: {e}"))?;

        let video_id = video.id;
        let last_decile = AtomicU64::new(0);
        let progress = move |done: u64, total: Option<u64>| {
            let Some(total) = total.filter(|t| *t > 0) else {
                return;
            };
            let decile = done.saturating_mul(10) / total;
            if decile > last_decile.swap(decile, Ordering::Relaxed) {
                tracing::info!(video_id, percent = decile * 10, "Download progress");
            }
        };

        let bytes = self
            .blobs
            .download(&video.storage_path, raw, Some(&progress))
            .await
            .map_err(|e| format!("download failed: {e}"))?;
        tracing::info!(video_id, bytes, "Video downloaded");

        let converted = local_media_path(&self.config.media_root, &video.storage_path);
        self.media
            .transcode(raw, &converted, &self.config.transcode)
            .await
            .map_err(|e| format!("conversion failed: {e}"))?;

        let info = match self.media.probe(&converted).await {
            Ok(info) => info,
            Err(e) => {
                remove_quietly(&converted).await;
                return Err(format!("probe failed: {e}"));
            }
        };

        Ok(VideoUpdate {
            status: Some(VideoStatus::NotAnnotated),
            duration_secs: Some(info.duration_secs),
            width: Some(info.width),
            height: Some(info.height),
            fps: Some(info.fps),
            size_bytes: Some(info.size_bytes),
            ..VideoUpdate::default()
        })
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}
