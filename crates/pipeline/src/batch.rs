//! Fan-out of clip jobs for one source video and aggregation of their
//! outcomes.
//!
//! Clip jobs run concurrently, bounded by a semaphore, each under its own
//! timeout. The aggregation step waits for every job; a panicked or
//! timed-out job counts as a failed clip. Source media is deleted only when
//! no clip failed, because a retry needs it to cut clips again.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use clipflow_core::config::PipelineConfig;
use clipflow_core::error::CoreError;
use clipflow_core::outcome::{BatchStatus, BatchSummary, BatchTally, ClipJobOutcome};
use clipflow_core::status::{ClipStatus, VideoStatus};
use clipflow_core::storage_path::local_media_path;
use clipflow_core::types::DbId;
use clipflow_core::video::{ClipStore, ClipUpdate, SourceVideo, VideoStore, VideoUpdate};
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::extraction::ClipJobRunner;

pub struct BatchOrchestrator {
    config: Arc<PipelineConfig>,
    videos: Arc<dyn VideoStore>,
    clips: Arc<dyn ClipStore>,
    runner: Arc<dyn ClipJobRunner>,
}

impl BatchOrchestrator {
    pub fn new(
        config: Arc<PipelineConfig>,
        videos: Arc<dyn VideoStore>,
        clips: Arc<dyn ClipStore>,
        runner: Arc<dyn ClipJobRunner>,
    ) -> Self {
        Self {
            config,
            videos,
            clips,
            runner,
        }
    }

    /// Extract every clip of `video_id` and finalize the video.
    pub async fn run(&self, video_id: DbId) -> Result<BatchSummary, CoreError> {
        let video = self
            .videos
            .get_by_id(video_id)
            .await?
            .ok_or_else(|| CoreError::not_found("SourceVideo", video_id))?;
        let clip_ids: Vec<DbId> = self
            .clips
            .list_by_source(video_id)
            .await?
            .into_iter()
            .map(|clip| clip.id)
            .collect();

        if clip_ids.is_empty() {
            tracing::error!(video_id, "Extraction requested for a video without clips");
            self.finish_status(&video, VideoStatus::AnnotationError).await?;
            return Ok(BatchSummary {
                video_id,
                status: BatchStatus::Error,
                tally: BatchTally::default(),
                source_deleted: false,
                message: format!("Video {video_id} has no clips to extract"),
                outcomes: Vec::new(),
            });
        }

        tracing::info!(video_id, clips = clip_ids.len(), "Clip batch started");
        let outcomes = self.fan_out(&clip_ids).await;
        let tally = BatchTally::from_outcomes(&outcomes);
        let status = BatchStatus::from_tally(&tally);

        let mut source_deleted = false;
        if tally.failed == 0 {
            source_deleted = self.remove_source_media(&video).await;
            let update = VideoUpdate {
                clip_ids: Some(clip_ids.clone()),
                ..VideoUpdate::default()
            };
            self.videos.update_fields(video_id, &update).await?;
            self.finish_status(&video, VideoStatus::Annotated).await?;
        } else if self.config.strict_annotation_status {
            self.finish_status(&video, VideoStatus::AnnotationError).await?;
        }

        let message = format!(
            "{} of {} clip(s) succeeded, {} without annotation task, {} failed",
            tally.successful, tally.total, tally.partial, tally.failed
        );
        tracing::info!(
            video_id,
            total = tally.total,
            successful = tally.successful,
            partial = tally.partial,
            failed = tally.failed,
            source_deleted,
            "Clip batch finished"
        );

        Ok(BatchSummary {
            video_id,
            status,
            tally,
            source_deleted,
            message,
            outcomes,
        })
    }

    /// Run all clip jobs and collect one outcome per clip, in input order.
    async fn fan_out(&self, clip_ids: &[DbId]) -> Vec<ClipJobOutcome> {
        let permits = Arc::new(Semaphore::new(self.config.extraction_concurrency.max(1)));
        let timeout = self.config.clip_job_timeout;
        let mut set = JoinSet::new();

        for &clip_id in clip_ids {
            let runner = Arc::clone(&self.runner);
            let permits = Arc::clone(&permits);
            set.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let job = AssertUnwindSafe(runner.run(clip_id)).catch_unwind();
                let result = match tokio::time::timeout(timeout, job).await {
                    Ok(Ok(outcome)) => Ok(outcome),
                    Ok(Err(_)) => Err("Clip job panicked".to_string()),
                    Err(_) => Err(format!("Clip job timed out after {}s", timeout.as_secs())),
                };
                (clip_id, result)
            });
        }

        let mut by_clip: HashMap<DbId, Result<ClipJobOutcome, String>> =
            HashMap::with_capacity(clip_ids.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((clip_id, result)) => {
                    by_clip.insert(clip_id, result);
                }
                Err(e) => tracing::error!(error = %e, "Clip job task failed to join"),
            }
        }

        let mut outcomes = Vec::with_capacity(clip_ids.len());
        for &clip_id in clip_ids {
            let result = by_clip
                .remove(&clip_id)
                .unwrap_or_else(|| Err("Clip job produced no result".to_string()));
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(message) => {
                    tracing::error!(clip_id, error = %message, "Clip job aborted");
                    self.mark_failed(clip_id).await;
                    ClipJobOutcome::error(clip_id, message)
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Crashed or timed-out jobs never reached their own failure handling.
    async fn mark_failed(&self, clip_id: DbId) {
        let update = ClipUpdate::status(ClipStatus::ProcessingFailed);
        if let Err(e) = self.clips.update_fields(clip_id, &update).await {
            tracing::warn!(clip_id, error = %e, "Failed to mark clip as failed");
        }
    }

    async fn finish_status(&self, video: &SourceVideo, next: VideoStatus) -> Result<(), CoreError> {
        if video.status == next || !video.status.can_transition_to(next) {
            return Ok(());
        }
        let update = VideoUpdate::transition(video.status, next);
        if !self.videos.update_fields(video.id, &update).await? {
            tracing::warn!(video_id = video.id, to = next.as_str(), "Video changed during the batch, status left alone");
            return Ok(());
        }
        tracing::info!(
            video_id = video.id,
            from = video.status.as_str(),
            to = next.as_str(),
            "Video status changed"
        );
        Ok(())
    }

    async fn remove_source_media(&self, video: &SourceVideo) -> bool {
        let path = local_media_path(&self.config.media_root, &video.storage_path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(video_id = video.id, path = %path.display(), "Source media removed");
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(video_id = video.id, path = %path.display(), error = %e, "Failed to remove source media");
                false
            }
        }
    }
}
