//! Source video and clip documents plus the record store contracts.
//!
//! The pipeline only depends on [`VideoStore`] and [`ClipStore`]; it assumes
//! read-your-writes within a process, store-enforced uniqueness, and that
//! partial updates leave unrelated fields alone.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CoreError;
use crate::fragments::ProjectParams;
use crate::status::{ClipStatus, VideoStatus};
use crate::storage_path::StoragePath;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Source video
// ---------------------------------------------------------------------------

/// A registered source video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceVideo {
    pub id: DbId,
    pub storage_path: StoragePath,
    pub status: VideoStatus,
    pub duration_secs: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<f64>,
    pub size_bytes: Option<i64>,
    /// Derived clip ids, populated only after a fully successful extraction.
    pub clip_ids: Vec<DbId>,
    pub skip_annotation: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Fields for a newly registered video.
#[derive(Debug, Clone)]
pub struct NewSourceVideo {
    pub storage_path: StoragePath,
    pub status: VideoStatus,
}

/// Partial update for a source video. `None` fields are left unchanged.
///
/// With `expected_status` set the update is a compare-and-set: it applies
/// only while the stored status still equals it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoUpdate {
    pub expected_status: Option<VideoStatus>,
    pub status: Option<VideoStatus>,
    pub duration_secs: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<f64>,
    pub size_bytes: Option<i64>,
    pub clip_ids: Option<Vec<DbId>>,
    pub skip_annotation: Option<bool>,
}

impl VideoUpdate {
    pub fn status(status: VideoStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Status change guarded by the status it was checked against.
    pub fn transition(from: VideoStatus, to: VideoStatus) -> Self {
        Self {
            expected_status: Some(from),
            status: Some(to),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Clip
// ---------------------------------------------------------------------------

/// A derived clip: one time range of a source video for one ML project.
///
/// Unique per `(source_video_id, params.project_id, clip_index)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clip {
    pub id: DbId,
    pub source_video_id: DbId,
    pub clip_index: i32,
    pub storage_path: StoragePath,
    pub start_offset_secs: f64,
    pub duration_secs: f64,
    pub params: ProjectParams,
    pub task_id: Option<i64>,
    pub status: ClipStatus,
    pub fps: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub size_bytes: Option<i64>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Fields for a clip created by a fragment submission.
#[derive(Debug, Clone, PartialEq)]
pub struct NewClip {
    pub clip_index: i32,
    pub storage_path: StoragePath,
    pub start_offset_secs: f64,
    pub duration_secs: f64,
    pub params: ProjectParams,
}

/// Partial update for a clip. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClipUpdate {
    pub status: Option<ClipStatus>,
    pub task_id: Option<i64>,
    pub fps: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub size_bytes: Option<i64>,
}

impl ClipUpdate {
    pub fn status(status: ClipStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Store contracts
// ---------------------------------------------------------------------------

/// Persistence for source videos.
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn get_by_path(&self, path: &StoragePath) -> Result<Option<SourceVideo>, CoreError>;

    async fn get_by_id(&self, id: DbId) -> Result<Option<SourceVideo>, CoreError>;

    /// Insert a video. A duplicate storage path is a [`CoreError::Conflict`].
    async fn create(&self, input: &NewSourceVideo) -> Result<SourceVideo, CoreError>;

    /// Apply a partial update. Returns `false` if the video does not exist
    /// or its status no longer matches `expected_status`.
    async fn update_fields(&self, id: DbId, update: &VideoUpdate) -> Result<bool, CoreError>;

    async fn list_all(&self, status: Option<VideoStatus>) -> Result<Vec<SourceVideo>, CoreError>;

    /// Delete a video and, by cascade, its clips.
    async fn delete(&self, id: DbId) -> Result<bool, CoreError>;

    /// Connectivity probe.
    async fn ping(&self) -> Result<(), CoreError>;
}

/// Persistence for derived clips.
#[async_trait]
pub trait ClipStore: Send + Sync {
    async fn get_by_id(&self, id: DbId) -> Result<Option<Clip>, CoreError>;

    /// All clips of a source video ordered by project then clip index.
    async fn list_by_source(&self, source_video_id: DbId) -> Result<Vec<Clip>, CoreError>;

    /// Atomically replace every clip of a source video with `clips`.
    async fn bulk_replace_for_source(
        &self,
        source_video_id: DbId,
        clips: &[NewClip],
    ) -> Result<Vec<Clip>, CoreError>;

    async fn update_fields(&self, id: DbId, update: &ClipUpdate) -> Result<bool, CoreError>;
}
