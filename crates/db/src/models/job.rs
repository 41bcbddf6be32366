//! Job queue rows.

use clipflow_core::error::CoreError;
use clipflow_core::queue::JobStatusReport;
use clipflow_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use super::status::{JobStatus, StatusId};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub kind: String,
    pub payload: serde_json::Value,
    pub status_id: StatusId,
    pub attempts: i32,
    pub max_attempts: i32,
    pub worker_name: Option<String>,
    pub claimed_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    pub fn status(&self) -> Result<JobStatus, CoreError> {
        JobStatus::from_id(self.status_id).ok_or_else(|| {
            CoreError::Internal(format!("job {} has unknown status {}", self.id, self.status_id))
        })
    }

    /// Queue-facing view: result on success, error on failure.
    pub fn report(&self) -> Result<JobStatusReport, CoreError> {
        let status = self.status()?;
        let meta = match status {
            JobStatus::Completed => self.result.clone().unwrap_or(serde_json::Value::Null),
            JobStatus::Failed => serde_json::json!({ "error": self.error_message }),
            JobStatus::Pending | JobStatus::Running => serde_json::Value::Null,
        };
        Ok(JobStatusReport {
            id: self.id,
            name: self.kind.clone(),
            state: status.state(),
            attempts: self.attempts,
            meta,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
