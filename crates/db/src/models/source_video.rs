use clipflow_core::error::CoreError;
use clipflow_core::status::VideoStatus;
use clipflow_core::storage_path::StoragePath;
use clipflow_core::types::{DbId, Timestamp};
use clipflow_core::video::SourceVideo;
use sqlx::FromRow;

/// A row from the `source_videos` table.
#[derive(Debug, Clone, FromRow)]
pub struct SourceVideoRow {
    pub id: DbId,
    pub storage_path: String,
    pub status: String,
    pub duration_secs: Option<f64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub fps: Option<f64>,
    pub size_bytes: Option<i64>,
    pub clip_ids: Vec<DbId>,
    pub skip_annotation: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<SourceVideoRow> for SourceVideo {
    type Error = CoreError;

    fn try_from(row: SourceVideoRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            storage_path: StoragePath::parse(&row.storage_path)?,
            status: VideoStatus::from_str(&row.status)?,
            duration_secs: row.duration_secs,
            width: row.width,
            height: row.height,
            fps: row.fps,
            size_bytes: row.size_bytes,
            clip_ids: row.clip_ids,
            skip_annotation: row.skip_annotation,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
