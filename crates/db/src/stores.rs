//! Adapters implementing the `clipflow-core` store traits on PostgreSQL.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use clipflow_core::error::CoreError;
use clipflow_core::lock::{ExpiringKvStore, KvEntry, KvError};
use clipflow_core::queue::{JobHandle, JobQueue, JobStatusReport, PipelineJob};
use clipflow_core::status::VideoStatus;
use clipflow_core::storage_path::StoragePath;
use clipflow_core::types::DbId;
use clipflow_core::video::{
    Clip, ClipStore, ClipUpdate, NewClip, NewSourceVideo, SourceVideo, VideoStore, VideoUpdate,
};

use crate::error::map_db_error;
use crate::repositories::{ClipRepo, JobRepo, KvEntryRepo, SourceVideoRepo};
use crate::DbPool;

// ---------------------------------------------------------------------------
// Source videos
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgVideoStore {
    pool: DbPool,
}

impl PgVideoStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VideoStore for PgVideoStore {
    async fn get_by_path(&self, path: &StoragePath) -> Result<Option<SourceVideo>, CoreError> {
        SourceVideoRepo::find_by_path(&self.pool, &path.to_string())
            .await
            .map_err(map_db_error)?
            .map(SourceVideo::try_from)
            .transpose()
    }

    async fn get_by_id(&self, id: DbId) -> Result<Option<SourceVideo>, CoreError> {
        SourceVideoRepo::find_by_id(&self.pool, id)
            .await
            .map_err(map_db_error)?
            .map(SourceVideo::try_from)
            .transpose()
    }

    async fn create(&self, input: &NewSourceVideo) -> Result<SourceVideo, CoreError> {
        let row = SourceVideoRepo::create(
            &self.pool,
            &input.storage_path.to_string(),
            input.status.as_str(),
        )
        .await
        .map_err(map_db_error)?;
        SourceVideo::try_from(row)
    }

    async fn update_fields(&self, id: DbId, update: &VideoUpdate) -> Result<bool, CoreError> {
        SourceVideoRepo::update(&self.pool, id, update)
            .await
            .map_err(map_db_error)
    }

    async fn list_all(&self, status: Option<VideoStatus>) -> Result<Vec<SourceVideo>, CoreError> {
        SourceVideoRepo::list(&self.pool, status.map(|s| s.as_str()))
            .await
            .map_err(map_db_error)?
            .into_iter()
            .map(SourceVideo::try_from)
            .collect()
    }

    async fn delete(&self, id: DbId) -> Result<bool, CoreError> {
        SourceVideoRepo::delete(&self.pool, id)
            .await
            .map_err(map_db_error)
    }

    async fn ping(&self) -> Result<(), CoreError> {
        crate::health_check(&self.pool).await.map_err(map_db_error)
    }
}

// ---------------------------------------------------------------------------
// Clips
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgClipStore {
    pool: DbPool,
}

impl PgClipStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClipStore for PgClipStore {
    async fn get_by_id(&self, id: DbId) -> Result<Option<Clip>, CoreError> {
        ClipRepo::find_by_id(&self.pool, id)
            .await
            .map_err(map_db_error)?
            .map(Clip::try_from)
            .transpose()
    }

    async fn list_by_source(&self, source_video_id: DbId) -> Result<Vec<Clip>, CoreError> {
        ClipRepo::list_by_source(&self.pool, source_video_id)
            .await
            .map_err(map_db_error)?
            .into_iter()
            .map(Clip::try_from)
            .collect()
    }

    async fn bulk_replace_for_source(
        &self,
        source_video_id: DbId,
        clips: &[NewClip],
    ) -> Result<Vec<Clip>, CoreError> {
        ClipRepo::replace_for_source(&self.pool, source_video_id, clips)
            .await
            .map_err(map_db_error)?
            .into_iter()
            .map(Clip::try_from)
            .collect()
    }

    async fn update_fields(&self, id: DbId, update: &ClipUpdate) -> Result<bool, CoreError> {
        ClipRepo::update(&self.pool, id, update)
            .await
            .map_err(map_db_error)
    }
}

// ---------------------------------------------------------------------------
// Expiring key-value store
// ---------------------------------------------------------------------------

/// [`ExpiringKvStore`] over the `kv_entries` table.
#[derive(Clone)]
pub struct PgKvStore {
    pool: DbPool,
}

impl PgKvStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Remove expired rows that nothing has overwritten.
    pub async fn purge_expired(&self) -> Result<u64, KvError> {
        KvEntryRepo::purge_expired(&self.pool).await.map_err(kv_error)
    }
}

/// Every database failure in the lock path is an availability failure;
/// callers must never read it as "no lock".
fn kv_error(err: sqlx::Error) -> KvError {
    tracing::error!(error = %err, "Key-value store query failed");
    KvError::Unavailable(err.to_string())
}

#[async_trait]
impl ExpiringKvStore for PgKvStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        KvEntryRepo::set_if_absent(&self.pool, key, value, ttl)
            .await
            .map_err(kv_error)
    }

    async fn get(&self, key: &str) -> Result<Option<KvEntry>, KvError> {
        Ok(KvEntryRepo::get(&self.pool, key)
            .await
            .map_err(kv_error)?
            .map(KvEntry::from))
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<KvEntry>>, KvError> {
        let mut by_key: HashMap<String, KvEntry> = KvEntryRepo::get_many(&self.pool, keys)
            .await
            .map_err(kv_error)?
            .into_iter()
            .map(|row| (row.key.clone(), KvEntry::from(row)))
            .collect();
        Ok(keys.iter().map(|k| by_key.remove(k)).collect())
    }

    async fn delete_if_value(&self, key: &str, expected: &str) -> Result<bool, KvError> {
        KvEntryRepo::delete_if_value(&self.pool, key, expected)
            .await
            .map_err(kv_error)
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        KvEntryRepo::delete(&self.pool, key).await.map_err(kv_error)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        KvEntryRepo::scan_prefix(&self.pool, prefix)
            .await
            .map_err(kv_error)
    }

    async fn ping(&self) -> Result<(), KvError> {
        crate::health_check(&self.pool).await.map_err(kv_error)
    }
}

// ---------------------------------------------------------------------------
// Job queue
// ---------------------------------------------------------------------------

/// [`JobQueue`] over the `jobs` table.
#[derive(Clone)]
pub struct PgJobQueue {
    pool: DbPool,
    max_attempts: i32,
}

impl PgJobQueue {
    pub fn new(pool: DbPool, max_attempts: i32) -> Self {
        Self { pool, max_attempts }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: &PipelineJob) -> Result<JobHandle, CoreError> {
        let payload = serde_json::to_value(job)
            .map_err(|e| CoreError::Internal(format!("failed to encode job: {e}")))?;
        let row = JobRepo::enqueue(&self.pool, job.name(), &payload, self.max_attempts)
            .await
            .map_err(map_db_error)?;
        tracing::debug!(job_id = row.id, kind = %row.kind, "Job enqueued");
        Ok(JobHandle {
            id: row.id,
            name: row.kind,
        })
    }

    async fn status(&self, job_id: DbId) -> Result<Option<JobStatusReport>, CoreError> {
        JobRepo::find_by_id(&self.pool, job_id)
            .await
            .map_err(map_db_error)?
            .map(|job| job.report())
            .transpose()
    }
}
