//! Single-clip extraction: cut, upload, register with the annotation tool.
//!
//! A clip job never returns an error. Every failure is recorded on the clip
//! (`clip_creation_failed`, `azure_upload_failed`, `cvat_failed`,
//! `processing_failed`) and reported as a [`ClipJobOutcome`], so one bad clip
//! cannot abort its batch.
//!
//! A clip whose artifact is already uploaded is never cut again. Re-running a
//! batch reports it from its stored record instead, so retries and redelivered
//! jobs touch only the clips that failed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use clipflow_core::annotation_tool::AnnotationTool;
use clipflow_core::blob::BlobStorage;
use clipflow_core::config::PipelineConfig;
use clipflow_core::fragments::format_timecode;
use clipflow_core::media::{MediaInfo, MediaTool};
use clipflow_core::outcome::ClipJobOutcome;
use clipflow_core::status::ClipStatus;
use clipflow_core::storage_path::{local_media_path, temp_clip_path};
use clipflow_core::types::DbId;
use clipflow_core::video::{Clip, ClipStore, ClipUpdate, VideoStore};

/// Runs one clip job. The batch orchestrator depends only on this seam.
#[async_trait]
pub trait ClipJobRunner: Send + Sync {
    async fn run(&self, clip_id: DbId) -> ClipJobOutcome;
}

/// Removes a scratch file when dropped, on every exit path.
struct TempFile(PathBuf);

impl TempFile {
    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.0.display(), error = %e, "Failed to remove temp clip");
            }
        }
    }
}

pub struct ClipExtractor {
    config: Arc<PipelineConfig>,
    videos: Arc<dyn VideoStore>,
    clips: Arc<dyn ClipStore>,
    blobs: Arc<dyn BlobStorage>,
    media: Arc<dyn MediaTool>,
    annotation: Arc<dyn AnnotationTool>,
}

impl ClipExtractor {
    pub fn new(
        config: Arc<PipelineConfig>,
        videos: Arc<dyn VideoStore>,
        clips: Arc<dyn ClipStore>,
        blobs: Arc<dyn BlobStorage>,
        media: Arc<dyn MediaTool>,
        annotation: Arc<dyn AnnotationTool>,
    ) -> Self {
        Self {
            config,
            videos,
            clips,
            blobs,
            media,
            annotation,
        }
    }

    /// Record a failure status and build the matching error outcome.
    async fn fail(&self, clip_id: DbId, status: ClipStatus, message: String) -> ClipJobOutcome {
        tracing::error!(clip_id, status = status.as_str(), error = %message, "Clip extraction failed");
        if let Err(e) = self.clips.update_fields(clip_id, &ClipUpdate::status(status)).await {
            tracing::warn!(clip_id, error = %e, "Failed to record clip failure");
        }
        ClipJobOutcome::error(clip_id, message)
    }

    async fn extract(&self, clip: Clip) -> ClipJobOutcome {
        let clip_id = clip.id;

        let video = match self.videos.get_by_id(clip.source_video_id).await {
            Ok(Some(video)) => video,
            Ok(None) => {
                return self
                    .fail(
                        clip_id,
                        ClipStatus::ProcessingFailed,
                        format!("Source video {} not found", clip.source_video_id),
                    )
                    .await
            }
            Err(e) => {
                return self
                    .fail(clip_id, ClipStatus::ProcessingFailed, e.to_string())
                    .await
            }
        };

        if let Err(e) = self
            .clips
            .update_fields(clip_id, &ClipUpdate::status(ClipStatus::Processing))
            .await
        {
            return ClipJobOutcome::error(clip_id, format!("Cannot start clip {clip_id}: {e}"));
        }

        let source = local_media_path(&self.config.media_root, &video.storage_path);
        if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
            return self
                .fail(
                    clip_id,
                    ClipStatus::ClipCreationFailed,
                    format!("Source media {} is missing", source.display()),
                )
                .await;
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.config.temp_dir).await {
            return self
                .fail(
                    clip_id,
                    ClipStatus::ClipCreationFailed,
                    format!("Cannot create temp directory: {e}"),
                )
                .await;
        }
        let temp = TempFile(temp_clip_path(&self.config.temp_dir, clip_id));

        let start = format_timecode(clip.start_offset_secs);
        let end = format_timecode(clip.start_offset_secs + clip.duration_secs);
        if let Err(e) = self.media.cut(&source, temp.path(), &start, &end).await {
            return self
                .fail(clip_id, ClipStatus::ClipCreationFailed, format!("Cut failed: {e}"))
                .await;
        }

        let info = match self.media.probe(temp.path()).await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(clip_id, error = %e, "Clip probe failed, metadata left empty");
                None
            }
        };

        let metadata = HashMap::from([
            ("source_video_id".to_string(), video.id.to_string()),
            ("clip_id".to_string(), clip_id.to_string()),
            ("project_id".to_string(), clip.params.project_id.to_string()),
            ("start".to_string(), start),
            ("end".to_string(), end),
        ]);
        if let Err(e) = self.blobs.upload(temp.path(), &clip.storage_path, &metadata).await {
            return self
                .fail(clip_id, ClipStatus::UploadFailed, format!("Upload failed: {e}"))
                .await;
        }
        tracing::info!(clip_id, blob = %clip.storage_path, "Clip uploaded");

        let task_name = clip.storage_path.file_stem().to_string();
        let task = self
            .annotation
            .create_task(&task_name, temp.path(), &clip.params)
            .await;

        let (status, outcome) = match task {
            Ok(Some(task_id)) => (ClipStatus::Ready, ClipJobOutcome::success(clip_id, task_id)),
            Ok(None) => (
                ClipStatus::TaskCreationFailed,
                ClipJobOutcome::partial(clip_id, "Annotation tool returned no task id"),
            ),
            Err(e) => (
                ClipStatus::TaskCreationFailed,
                ClipJobOutcome::partial(clip_id, format!("Task creation failed: {e}")),
            ),
        };

        let update = clip_update(status, outcome.task_id, info.as_ref());
        match self.clips.update_fields(clip_id, &update).await {
            Ok(_) => {
                tracing::info!(clip_id, status = status.as_str(), task_id = ?outcome.task_id, "Clip processed");
                outcome
            }
            Err(e) => {
                self.fail(
                    clip_id,
                    ClipStatus::ProcessingFailed,
                    format!("Clip result could not be recorded: {e}"),
                )
                .await
            }
        }
    }
}

/// Outcome of a clip that was already extracted, or `None` if it must run.
fn recorded_outcome(clip: &Clip) -> Option<ClipJobOutcome> {
    if !clip.status.has_artifact() {
        return None;
    }
    Some(match (clip.status, clip.task_id) {
        (ClipStatus::Ready, Some(task_id)) => ClipJobOutcome::success(clip.id, task_id),
        _ => ClipJobOutcome::partial(clip.id, "Clip uploaded earlier without annotation task"),
    })
}

fn clip_update(status: ClipStatus, task_id: Option<i64>, info: Option<&MediaInfo>) -> ClipUpdate {
    ClipUpdate {
        status: Some(status),
        task_id,
        fps: info.map(|i| i.fps),
        width: info.map(|i| i.width),
        height: info.map(|i| i.height),
        size_bytes: info.map(|i| i.size_bytes),
    }
}

#[async_trait]
impl ClipJobRunner for ClipExtractor {
    async fn run(&self, clip_id: DbId) -> ClipJobOutcome {
        match self.clips.get_by_id(clip_id).await {
            Ok(Some(clip)) => match recorded_outcome(&clip) {
                Some(outcome) => {
                    tracing::debug!(clip_id, status = clip.status.as_str(), "Clip already extracted, kept");
                    outcome
                }
                None => self.extract(clip).await,
            },
            Ok(None) => ClipJobOutcome::error(clip_id, format!("Clip {clip_id} not found")),
            Err(e) => ClipJobOutcome::error(clip_id, format!("Cannot load clip {clip_id}: {e}")),
        }
    }
}
