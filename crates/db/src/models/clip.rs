use clipflow_core::error::CoreError;
use clipflow_core::fragments::ProjectParams;
use clipflow_core::status::ClipStatus;
use clipflow_core::storage_path::StoragePath;
use clipflow_core::types::{DbId, Timestamp};
use clipflow_core::video::Clip;
use sqlx::FromRow;

/// A row from the `clips` table. Project parameters are stored inline.
#[derive(Debug, Clone, FromRow)]
pub struct ClipRow {
    pub id: DbId,
    pub source_video_id: DbId,
    pub project_id: DbId,
    pub clip_index: i32,
    pub storage_path: String,
    pub start_offset_secs: f64,
    pub duration_secs: f64,
    pub overlap: i32,
    pub segment_size: i32,
    pub image_quality: i32,
    pub task_id: Option<i64>,
    pub status: String,
    pub fps: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub size_bytes: Option<i64>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<ClipRow> for Clip {
    type Error = CoreError;

    fn try_from(row: ClipRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            source_video_id: row.source_video_id,
            clip_index: row.clip_index,
            storage_path: StoragePath::parse(&row.storage_path)?,
            start_offset_secs: row.start_offset_secs,
            duration_secs: row.duration_secs,
            params: ProjectParams {
                project_id: row.project_id,
                overlap: row.overlap,
                segment_size: row.segment_size,
                image_quality: row.image_quality,
            },
            task_id: row.task_id,
            status: ClipStatus::from_str(&row.status)?,
            fps: row.fps,
            width: row.width,
            height: row.height,
            size_bytes: row.size_bytes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
