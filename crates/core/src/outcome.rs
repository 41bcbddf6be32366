//! Per-clip job outcomes and their batch-level aggregation.
//!
//! A clip job reports one of three states. `PartialSuccess` means the clip
//! artifact exists but no annotation task was created; it counts as usable
//! when deciding whether the batch may clean up the source media.

use serde::{Deserialize, Serialize};

use crate::types::DbId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipJobStatus {
    Success,
    PartialSuccess,
    Error,
}

/// Result of one clip extraction job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipJobOutcome {
    pub status: ClipJobStatus,
    pub message: String,
    pub clip_id: DbId,
    pub task_id: Option<i64>,
}

impl ClipJobOutcome {
    pub fn success(clip_id: DbId, task_id: i64) -> Self {
        Self {
            status: ClipJobStatus::Success,
            message: format!("Clip {clip_id} ready with task {task_id}"),
            clip_id,
            task_id: Some(task_id),
        }
    }

    pub fn partial(clip_id: DbId, message: impl Into<String>) -> Self {
        Self {
            status: ClipJobStatus::PartialSuccess,
            message: message.into(),
            clip_id,
            task_id: None,
        }
    }

    pub fn error(clip_id: DbId, message: impl Into<String>) -> Self {
        Self {
            status: ClipJobStatus::Error,
            message: message.into(),
            clip_id,
            task_id: None,
        }
    }
}

/// Counts of clip outcomes for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchTally {
    pub total: usize,
    pub successful: usize,
    pub partial: usize,
    pub failed: usize,
}

impl BatchTally {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a ClipJobOutcome>) -> Self {
        let mut tally = Self::default();
        for outcome in outcomes {
            tally.record(outcome.status);
        }
        tally
    }

    pub fn record(&mut self, status: ClipJobStatus) {
        self.total += 1;
        match status {
            ClipJobStatus::Success => self.successful += 1,
            ClipJobStatus::PartialSuccess => self.partial += 1,
            ClipJobStatus::Error => self.failed += 1,
        }
    }

    /// Every clip produced a usable artifact.
    pub fn all_usable(&self) -> bool {
        self.total > 0 && self.failed == 0
    }
}

/// Batch-level verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// No clip failed; source media removed and clip list recorded.
    Completed,
    /// At least one clip failed; source media kept for retry.
    PartialSuccess,
    /// The batch could not run at all (missing video, no clips).
    Error,
}

impl BatchStatus {
    pub fn from_tally(tally: &BatchTally) -> Self {
        if tally.total == 0 {
            Self::Error
        } else if tally.failed == 0 {
            Self::Completed
        } else {
            Self::PartialSuccess
        }
    }
}

/// Summary returned by the batch orchestrator and stored as job result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub video_id: DbId,
    pub status: BatchStatus,
    pub tally: BatchTally,
    pub source_deleted: bool,
    pub message: String,
    pub outcomes: Vec<ClipJobOutcome>,
}
