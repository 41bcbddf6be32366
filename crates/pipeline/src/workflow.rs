//! User-facing video workflow: registration, locking, fragment submission
//! and administrative operations.
//!
//! The record store holds the video status, the key-value store holds the
//! lock, and the two are written one after the other. Every operation here
//! orders those writes so that a crash in between leaves a state the
//! maintenance sweep can repair (`in_progress` without a lock).

use std::sync::Arc;

use clipflow_core::blob::BlobStorage;
use clipflow_core::config::PipelineConfig;
use clipflow_core::error::CoreError;
use clipflow_core::fragments::{plan_clips, FragmentSubmission};
use clipflow_core::lock::{AcquireOutcome, LockHolder, LockHolderInfo, LockStatus, ReleaseOutcome};
use clipflow_core::queue::{JobHandle, JobQueue, JobStatusReport, PipelineJob};
use clipflow_core::status::VideoStatus;
use clipflow_core::storage_path::{clip_folder_prefix, derived_clip_path, local_media_path, StoragePath};
use clipflow_core::types::{DbId, Timestamp};
use clipflow_core::video::{ClipStore, NewClip, NewSourceVideo, SourceVideo, VideoStore, VideoUpdate};
use serde::Serialize;

use crate::lock_service::LockService;

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub video: SourceVideo,
    pub job: JobHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockGrant {
    pub video_id: DbId,
    pub status: VideoStatus,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
    /// The caller already held the lease before this request.
    pub already_held: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnlockResult {
    pub video_id: DbId,
    pub status: VideoStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct VideoListing {
    #[serde(flatten)]
    pub video: SourceVideo,
    pub lock: LockStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentSaveResult {
    pub id: DbId,
    pub status: VideoStatus,
    /// Extraction job id; absent for skip submissions.
    pub task_id: Option<DbId>,
    pub clip_count: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoStatusView {
    pub id: DbId,
    pub status: VideoStatus,
    pub ready_for_annotation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub video_id: DbId,
    pub lock_released: bool,
    pub media_removed: bool,
    pub clip_blobs_removed: usize,
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct VideoWorkflow {
    config: Arc<PipelineConfig>,
    videos: Arc<dyn VideoStore>,
    clips: Arc<dyn ClipStore>,
    locks: LockService,
    blobs: Arc<dyn BlobStorage>,
    queue: Arc<dyn JobQueue>,
}

impl VideoWorkflow {
    pub fn new(
        config: Arc<PipelineConfig>,
        videos: Arc<dyn VideoStore>,
        clips: Arc<dyn ClipStore>,
        locks: LockService,
        blobs: Arc<dyn BlobStorage>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            config,
            videos,
            clips,
            locks,
            blobs,
            queue,
        }
    }

    pub fn locks(&self) -> &LockService {
        &self.locks
    }

    async fn load(&self, video_id: DbId) -> Result<SourceVideo, CoreError> {
        self.videos
            .get_by_id(video_id)
            .await?
            .ok_or_else(|| CoreError::not_found("SourceVideo", video_id))
    }

    /// Move `video` to `next`, provided nobody changed its status since it
    /// was loaded.
    async fn set_status(&self, video: &SourceVideo, next: VideoStatus) -> Result<(), CoreError> {
        video.status.ensure_transition(next)?;
        let update = VideoUpdate::transition(video.status, next);
        if !self.videos.update_fields(video.id, &update).await? {
            return Err(self.write_conflict(video).await);
        }
        tracing::info!(
            video_id = video.id,
            from = video.status.as_str(),
            to = next.as_str(),
            "Video status changed"
        );
        Ok(())
    }

    /// Explain a guarded write that matched no row.
    async fn write_conflict(&self, video: &SourceVideo) -> CoreError {
        match self.videos.get_by_id(video.id).await {
            Ok(Some(current)) => CoreError::InvalidState(format!(
                "Video {} changed from '{}' to '{}' concurrently",
                video.id, video.status, current.status
            )),
            Ok(None) => CoreError::not_found("SourceVideo", video.id),
            Err(e) => e,
        }
    }

    // -- registration -------------------------------------------------------

    /// Register an externally stored video and enqueue its ingest job.
    ///
    /// The path may be `account/container/blob` or a full blob URL. It must
    /// reference the configured storage account and an existing object.
    pub async fn register_video(&self, raw_path: &str) -> Result<Registration, CoreError> {
        let path = StoragePath::parse(raw_path)?;
        path.ensure_account(&self.config.storage_account)?;

        if !self.blobs.exists(&path).await? {
            return Err(CoreError::not_found("Blob", &path));
        }
        if self.videos.get_by_path(&path).await?.is_some() {
            return Err(CoreError::Conflict(format!(
                "Video '{path}' is already registered"
            )));
        }

        let video = self
            .videos
            .create(&NewSourceVideo {
                storage_path: path,
                status: VideoStatus::Downloading,
            })
            .await?;

        let job = match self
            .queue
            .enqueue(&PipelineJob::IngestVideo { video_id: video.id })
            .await
        {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(video_id = video.id, error = %e, "Failed to enqueue ingest job");
                self.videos
                    .update_fields(video.id, &VideoUpdate::status(VideoStatus::DownloadError))
                    .await?;
                return Err(e);
            }
        };

        tracing::info!(video_id = video.id, path = %video.storage_path, job_id = job.id, "Video registered");
        Ok(Registration { video, job })
    }

    // -- locking ------------------------------------------------------------

    /// Take the annotation lock and move the video to `in_progress`.
    pub async fn lock_video(
        &self,
        video_id: DbId,
        holder: &LockHolder,
    ) -> Result<LockGrant, CoreError> {
        let video = self.load(video_id).await?;
        if !video.status.is_lockable() {
            return Err(CoreError::InvalidState(format!(
                "Video {video_id} is '{}' and cannot be locked",
                video.status
            )));
        }

        let (acquired_at, expires_at, already_held) =
            match self.locks.acquire(video_id, holder).await? {
                AcquireOutcome::Granted { expires_at } => {
                    (expires_at - self.locks.ttl(), expires_at, false)
                }
                AcquireOutcome::AlreadyHeld {
                    acquired_at,
                    expires_at,
                } => (acquired_at, expires_at, true),
                AcquireOutcome::Denied(info) => return Err(CoreError::LockHeld(info)),
            };

        let mut status = video.status;
        if status == VideoStatus::NotAnnotated {
            if let Err(e) = self.set_status(&video, VideoStatus::InProgress).await {
                // Do not leave a lease behind for a video that never moved.
                if !already_held {
                    if let Err(release_err) = self.locks.release(video_id, holder.user_id).await {
                        tracing::warn!(video_id, error = %release_err, "Failed to roll back lock");
                    }
                }
                return Err(e);
            }
            status = VideoStatus::InProgress;
        }

        Ok(LockGrant {
            video_id,
            status,
            acquired_at,
            expires_at,
            already_held,
        })
    }

    /// Release the caller's lock and return the video to `not_annotated`.
    pub async fn unlock_video(
        &self,
        video_id: DbId,
        holder_id: DbId,
    ) -> Result<UnlockResult, CoreError> {
        let video = self.load(video_id).await?;

        match self.locks.release(video_id, holder_id).await? {
            ReleaseOutcome::Released => {}
            ReleaseOutcome::NotHeld => return Err(CoreError::not_found("VideoLock", video_id)),
            ReleaseOutcome::NotOwner(info) => {
                return Err(CoreError::Forbidden(format!(
                    "Video {video_id} is locked by {}",
                    info.holder_label
                )))
            }
        }

        let mut status = video.status;
        if status == VideoStatus::InProgress {
            self.set_status(&video, VideoStatus::NotAnnotated).await?;
            status = VideoStatus::NotAnnotated;
        }
        Ok(UnlockResult { video_id, status })
    }

    pub async fn lock_status(&self, video_id: DbId) -> Result<LockStatus, CoreError> {
        self.load(video_id).await?;
        self.locks.status(video_id).await
    }

    /// Lock status for many videos, in the order requested.
    pub async fn batch_lock_status(&self, video_ids: &[DbId]) -> Result<Vec<LockStatus>, CoreError> {
        let mut statuses = self.locks.batch_status(video_ids).await?;
        Ok(video_ids
            .iter()
            .map(|id| {
                statuses
                    .remove(id)
                    .unwrap_or_else(|| LockStatus::unlocked(*id))
            })
            .collect())
    }

    /// All videos, newest first, each with its lock status.
    pub async fn list_videos(
        &self,
        status: Option<VideoStatus>,
    ) -> Result<Vec<VideoListing>, CoreError> {
        let videos = self.videos.list_all(status).await?;
        let ids: Vec<DbId> = videos.iter().map(|v| v.id).collect();
        let mut locks = self.locks.batch_status(&ids).await?;

        Ok(videos
            .into_iter()
            .map(|video| {
                let lock = locks
                    .remove(&video.id)
                    .unwrap_or_else(|| LockStatus::unlocked(video.id));
                VideoListing { video, lock }
            })
            .collect())
    }

    pub async fn video_status(&self, video_id: DbId) -> Result<VideoStatusView, CoreError> {
        let video = self.load(video_id).await?;
        Ok(VideoStatusView {
            id: video.id,
            status: video.status,
            ready_for_annotation: video.status.is_ready_for_annotation(),
        })
    }

    // -- fragment submission ------------------------------------------------

    /// Persist an annotator's fragment submission.
    ///
    /// The whole submission is validated before anything is written. A
    /// non-skip submission replaces the video's clip set with pending clips
    /// and enqueues one extraction job; the submitter's lock is released.
    pub async fn save_fragments(
        &self,
        video_id: DbId,
        submitter: &LockHolder,
        submission: &FragmentSubmission,
    ) -> Result<FragmentSaveResult, CoreError> {
        let video = self.load(video_id).await?;
        let specs = plan_clips(submission, self.config.min_clip_duration_secs)?;

        let target = if submission.skip || !self.config.strict_annotation_status {
            VideoStatus::Annotated
        } else {
            VideoStatus::ProcessingClips
        };
        video.status.ensure_transition(target)?;

        let lock = self.locks.status(video_id).await?;
        if let (true, Some(holder_id)) = (lock.locked, lock.holder_id) {
            if holder_id != submitter.user_id {
                return Err(CoreError::LockHeld(LockHolderInfo {
                    holder_id,
                    holder_label: lock.holder_label.unwrap_or_default(),
                    acquired_at: lock.acquired_at.unwrap_or_else(chrono::Utc::now),
                }));
            }
        }

        let new_clips = specs
            .iter()
            .map(|spec| {
                Ok(NewClip {
                    clip_index: spec.clip_index,
                    storage_path: derived_clip_path(
                        &video.storage_path,
                        &self.config.clip_container,
                        spec.params.project_id,
                        spec.clip_index,
                    )?,
                    start_offset_secs: spec.start_offset_secs,
                    duration_secs: spec.duration_secs,
                    params: spec.params,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        self.clips.bulk_replace_for_source(video_id, &new_clips).await?;
        let update = VideoUpdate {
            status: Some(target),
            clip_ids: Some(Vec::new()),
            skip_annotation: Some(submission.skip),
            ..VideoUpdate::transition(video.status, target)
        };
        if !self.videos.update_fields(video_id, &update).await? {
            return Err(self.write_conflict(&video).await);
        }
        tracing::info!(
            video_id,
            clips = new_clips.len(),
            skip = submission.skip,
            status = target.as_str(),
            "Fragments saved"
        );

        let job = if submission.skip {
            None
        } else {
            match self.queue.enqueue(&PipelineJob::ExtractClips { video_id }).await {
                Ok(job) => Some(job),
                Err(e) => {
                    tracing::error!(video_id, error = %e, "Failed to enqueue clip extraction");
                    if target == VideoStatus::ProcessingClips {
                        self.videos
                            .update_fields(
                                video_id,
                                &VideoUpdate::status(VideoStatus::AnnotationError),
                            )
                            .await?;
                    }
                    return Err(e);
                }
            }
        };

        match self.locks.release(video_id, submitter.user_id).await {
            Ok(_) => {}
            Err(e) => tracing::warn!(video_id, error = %e, "Failed to release lock after save"),
        }

        let message = match &job {
            Some(job) => format!(
                "Saved {} clip(s) for video {video_id}; extraction job {} queued",
                new_clips.len(),
                job.id
            ),
            None => format!("Video {video_id} marked annotated without clips"),
        };
        Ok(FragmentSaveResult {
            id: video_id,
            status: target,
            task_id: job.map(|job| job.id),
            clip_count: new_clips.len(),
            message,
        })
    }

    /// Re-run extraction for a video whose last batch left failed clips.
    ///
    /// Clips that already have an artifact are kept by the extraction job,
    /// so only the failed ones are cut again. A video whose batch completed
    /// has nothing left to retry.
    pub async fn retry_extraction(&self, video_id: DbId) -> Result<JobHandle, CoreError> {
        let video = self.load(video_id).await?;
        if !matches!(
            video.status,
            VideoStatus::Annotated | VideoStatus::AnnotationError
        ) || video.skip_annotation
        {
            return Err(CoreError::InvalidState(format!(
                "Video {video_id} is '{}' and has no clips to extract",
                video.status
            )));
        }
        if !video.clip_ids.is_empty() {
            return Err(CoreError::InvalidState(format!(
                "Video {video_id} already has all {} clip(s) extracted",
                video.clip_ids.len()
            )));
        }
        if self.clips.list_by_source(video_id).await?.is_empty() {
            return Err(CoreError::InvalidState(format!(
                "Video {video_id} has no clips to extract"
            )));
        }

        if self.config.strict_annotation_status {
            self.set_status(&video, VideoStatus::ProcessingClips).await?;
        }
        let job = self
            .queue
            .enqueue(&PipelineJob::ExtractClips { video_id })
            .await?;
        tracing::info!(video_id, job_id = job.id, "Clip extraction re-queued");
        Ok(job)
    }

    pub async fn job_status(&self, job_id: DbId) -> Result<JobStatusReport, CoreError> {
        self.queue
            .status(job_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Job", job_id))
    }

    // -- administration -----------------------------------------------------

    /// Delete a video, its clips, its lock, its local media and its clip
    /// blobs. Only the record deletion is required to succeed.
    pub async fn delete_video(&self, video_id: DbId) -> Result<DeleteReport, CoreError> {
        let video = self.load(video_id).await?;

        if !self.videos.delete(video_id).await? {
            return Err(CoreError::not_found("SourceVideo", video_id));
        }
        tracing::warn!(video_id, path = %video.storage_path, "Video deleted");

        let lock_released = match self.locks.force_release(video_id).await {
            Ok(released) => released,
            Err(e) => {
                tracing::warn!(video_id, error = %e, "Failed to release lock of deleted video");
                false
            }
        };

        let media = local_media_path(&self.config.media_root, &video.storage_path);
        let media_removed = match tokio::fs::remove_file(&media).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!(video_id, path = %media.display(), error = %e, "Failed to remove media");
                false
            }
        };

        let clip_blobs_removed = self.remove_clip_blobs(&video).await;

        Ok(DeleteReport {
            video_id,
            lock_released,
            media_removed,
            clip_blobs_removed,
        })
    }

    async fn remove_clip_blobs(&self, video: &SourceVideo) -> usize {
        let prefix = clip_folder_prefix(&video.storage_path, &self.config.clip_container);
        let blobs = match self.blobs.list(&prefix).await {
            Ok(blobs) => blobs,
            Err(e) => {
                tracing::warn!(video_id = video.id, prefix, error = %e, "Failed to list clip blobs");
                return 0;
            }
        };

        let mut removed = 0;
        for blob in &blobs {
            match self.blobs.delete(blob).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(video_id = video.id, blob = %blob, error = %e, "Failed to delete clip blob"),
            }
        }
        removed
    }

    /// Reset `in_progress` videos that no longer have a lock.
    ///
    /// Idempotent: a second run finds nothing to repair. Each candidate's
    /// lock is re-read right before the reset to narrow the race with a
    /// concurrent acquisition.
    pub async fn repair_orphans(&self) -> Result<usize, CoreError> {
        let candidates = self.videos.list_all(Some(VideoStatus::InProgress)).await?;
        if candidates.is_empty() {
            return Ok(0);
        }
        let ids: Vec<DbId> = candidates.iter().map(|v| v.id).collect();
        let locks = self.locks.batch_status(&ids).await?;

        let mut repaired = 0;
        for video in &candidates {
            if locks.get(&video.id).is_some_and(|lock| lock.locked) {
                continue;
            }
            if self.locks.status(video.id).await?.locked {
                continue;
            }
            match self.set_status(video, VideoStatus::NotAnnotated).await {
                Ok(()) => {}
                // Someone moved it on since the listing; nothing to repair.
                Err(CoreError::InvalidState(reason)) => {
                    tracing::debug!(video_id = video.id, reason = %reason, "Orphan candidate changed, skipped");
                    continue;
                }
                Err(e) => return Err(e),
            }
            tracing::warn!(video_id = video.id, "Orphaned in_progress video reset");
            repaired += 1;
        }
        Ok(repaired)
    }
}
