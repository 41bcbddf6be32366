//! Background job queue contract.
//!
//! Jobs are at-least-once: a job whose worker disappears is handed to another
//! worker, so every job body must be idempotent against the record store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// A unit of background work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "args", rename_all = "snake_case")]
pub enum PipelineJob {
    /// Download, probe and convert a freshly registered source video.
    IngestVideo { video_id: DbId },
    /// Fan out clip extraction for a source video and aggregate the results.
    ExtractClips { video_id: DbId },
    /// Lock sweep, orphan repair and health snapshot.
    MaintenanceSweep,
}

impl PipelineJob {
    /// Stable job name, also the `kind` column of a persisted job.
    pub fn name(&self) -> &'static str {
        match self {
            Self::IngestVideo { .. } => "ingest_video",
            Self::ExtractClips { .. } => "extract_clips",
            Self::MaintenanceSweep => "maintenance_sweep",
        }
    }
}

/// Returned by [`JobQueue::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    pub id: DbId,
    pub name: String,
}

/// Externally visible job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Progress,
    Success,
    Failure,
}

/// Status of one job with its result or error metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusReport {
    pub id: DbId,
    pub name: String,
    pub state: JobState,
    pub attempts: i32,
    /// Job result on success, `{"error": ...}` on failure, `null` otherwise.
    pub meta: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &PipelineJob) -> Result<JobHandle, CoreError>;

    async fn status(&self, job_id: DbId) -> Result<Option<JobStatusReport>, CoreError>;
}
