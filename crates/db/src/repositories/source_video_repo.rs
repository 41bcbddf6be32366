use clipflow_core::types::DbId;
use clipflow_core::video::VideoUpdate;
use sqlx::PgPool;

use crate::models::source_video::SourceVideoRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, storage_path, status, duration_secs, width, height, fps, size_bytes, \
    clip_ids, skip_annotation, created_at, updated_at";

/// Provides CRUD operations for source videos.
pub struct SourceVideoRepo;

impl SourceVideoRepo {
    /// Insert a new source video, returning the created row.
    ///
    /// A duplicate storage path fails with the `uq_source_videos_storage_path`
    /// unique violation.
    pub async fn create(
        pool: &PgPool,
        storage_path: &str,
        status: &str,
    ) -> Result<SourceVideoRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO source_videos (storage_path, status) \
             VALUES ($1, $2) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SourceVideoRow>(&query)
            .bind(storage_path)
            .bind(status)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<SourceVideoRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM source_videos WHERE id = $1");
        sqlx::query_as::<_, SourceVideoRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_path(
        pool: &PgPool,
        storage_path: &str,
    ) -> Result<Option<SourceVideoRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM source_videos WHERE storage_path = $1");
        sqlx::query_as::<_, SourceVideoRow>(&query)
            .bind(storage_path)
            .fetch_optional(pool)
            .await
    }

    /// List videos, newest first, optionally filtered by status.
    pub async fn list(
        pool: &PgPool,
        status: Option<&str>,
    ) -> Result<Vec<SourceVideoRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM source_videos \
             WHERE ($1::TEXT IS NULL OR status = $1) \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, SourceVideoRow>(&query)
            .bind(status)
            .fetch_all(pool)
            .await
    }

    /// Apply a partial update. Only non-`None` fields are written.
    ///
    /// Returns `false` if no row with the given `id` exists, or if
    /// `expected_status` is set and the stored status differs.
    pub async fn update(pool: &PgPool, id: DbId, input: &VideoUpdate) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE source_videos SET \
                 status = COALESCE($2, status), \
                 duration_secs = COALESCE($3, duration_secs), \
                 width = COALESCE($4, width), \
                 height = COALESCE($5, height), \
                 fps = COALESCE($6, fps), \
                 size_bytes = COALESCE($7, size_bytes), \
                 clip_ids = COALESCE($8, clip_ids), \
                 skip_annotation = COALESCE($9, skip_annotation), \
                 updated_at = NOW() \
             WHERE id = $1 AND ($10::TEXT IS NULL OR status = $10)",
        )
        .bind(id)
        .bind(input.status.map(|s| s.as_str()))
        .bind(input.duration_secs)
        .bind(input.width)
        .bind(input.height)
        .bind(input.fps)
        .bind(input.size_bytes)
        .bind(input.clip_ids.as_deref())
        .bind(input.skip_annotation)
        .bind(input.expected_status.map(|s| s.as_str()))
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Hard-delete a video. Clips are removed by `ON DELETE CASCADE`.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM source_videos WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
