use clipflow_core::types::DbId;
use clipflow_core::video::{ClipUpdate, NewClip};
use sqlx::PgPool;

use crate::models::clip::ClipRow;

const COLUMNS: &str = "\
    id, source_video_id, project_id, clip_index, storage_path, \
    start_offset_secs, duration_secs, overlap, segment_size, image_quality, \
    task_id, status, fps, width, height, size_bytes, created_at, updated_at";

/// Provides operations for clips derived from a source video.
pub struct ClipRepo;

impl ClipRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ClipRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM clips WHERE id = $1");
        sqlx::query_as::<_, ClipRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All clips of a source video ordered by project, then clip index.
    pub async fn list_by_source(
        pool: &PgPool,
        source_video_id: DbId,
    ) -> Result<Vec<ClipRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM clips \
             WHERE source_video_id = $1 \
             ORDER BY project_id, clip_index"
        );
        sqlx::query_as::<_, ClipRow>(&query)
            .bind(source_video_id)
            .fetch_all(pool)
            .await
    }

    /// Replace every clip of a source video within one transaction.
    ///
    /// Either the old set is fully replaced or nothing changes.
    pub async fn replace_for_source(
        pool: &PgPool,
        source_video_id: DbId,
        clips: &[NewClip],
    ) -> Result<Vec<ClipRow>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let removed = sqlx::query("DELETE FROM clips WHERE source_video_id = $1")
            .bind(source_video_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let query = format!(
            "INSERT INTO clips \
                 (source_video_id, project_id, clip_index, storage_path, \
                  start_offset_secs, duration_secs, overlap, segment_size, image_quality, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending') \
             RETURNING {COLUMNS}"
        );

        let mut rows = Vec::with_capacity(clips.len());
        for clip in clips {
            let row = sqlx::query_as::<_, ClipRow>(&query)
                .bind(source_video_id)
                .bind(clip.params.project_id)
                .bind(clip.clip_index)
                .bind(clip.storage_path.to_string())
                .bind(clip.start_offset_secs)
                .bind(clip.duration_secs)
                .bind(clip.params.overlap)
                .bind(clip.params.segment_size)
                .bind(clip.params.image_quality)
                .fetch_one(&mut *tx)
                .await?;
            rows.push(row);
        }

        tx.commit().await?;
        tracing::debug!(source_video_id, removed, inserted = rows.len(), "Replaced clip set");
        Ok(rows)
    }

    /// Apply a partial update. Only non-`None` fields are written.
    pub async fn update(pool: &PgPool, id: DbId, input: &ClipUpdate) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE clips SET \
                 status = COALESCE($2, status), \
                 task_id = COALESCE($3, task_id), \
                 fps = COALESCE($4, fps), \
                 width = COALESCE($5, width), \
                 height = COALESCE($6, height), \
                 size_bytes = COALESCE($7, size_bytes), \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(input.status.map(|s| s.as_str()))
        .bind(input.task_id)
        .bind(input.fps)
        .bind(input.width)
        .bind(input.height)
        .bind(input.size_bytes)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
