//! Source video and clip lifecycle statuses.
//!
//! Both enums persist as lowercase text (`as_str` / `from_str`) and every
//! transition site matches on them exhaustively, so a new status is a
//! compile-checked change.
//!
//! Source video state machine:
//!
//! ```text
//! downloading ──▶ not_annotated ◀──▶ in_progress ──▶ processing_clips ──▶ annotated
//!      │                                  │                  │
//!      ▼                                  └──▶ annotated     └──▶ annotation_error
//! download_error
//!
//! annotated / annotation_error ──▶ processing_clips | annotated   (resubmission)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// VideoStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a registered source video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Registered; background download + convert job enqueued or running.
    Downloading,
    /// Media is local and converted; anyone may lock it.
    NotAnnotated,
    /// An annotator holds (or held) the lock.
    InProgress,
    /// Fragments saved, clips still being extracted (strict mode only).
    ProcessingClips,
    /// Annotation data captured.
    Annotated,
    /// Download, probe or conversion failed.
    DownloadError,
    /// Clip extraction could not produce a usable clip set.
    AnnotationError,
}

impl VideoStatus {
    pub const ALL: [VideoStatus; 7] = [
        Self::Downloading,
        Self::NotAnnotated,
        Self::InProgress,
        Self::ProcessingClips,
        Self::Annotated,
        Self::DownloadError,
        Self::AnnotationError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::NotAnnotated => "not_annotated",
            Self::InProgress => "in_progress",
            Self::ProcessingClips => "processing_clips",
            Self::Annotated => "annotated",
            Self::DownloadError => "download_error",
            Self::AnnotationError => "annotation_error",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown video status: '{s}'")))
    }

    /// Whether a lock may be acquired while the video is in this status.
    ///
    /// `in_progress` is allowed so the current holder can re-enter; the lock
    /// store decides whether a different user is denied.
    pub fn is_lockable(&self) -> bool {
        match self {
            Self::NotAnnotated | Self::InProgress => true,
            Self::Downloading
            | Self::ProcessingClips
            | Self::Annotated
            | Self::DownloadError
            | Self::AnnotationError => false,
        }
    }

    /// Whether the video is waiting for (or undergoing) human annotation.
    pub fn is_ready_for_annotation(&self) -> bool {
        self.is_lockable()
    }

    /// Whether the status is terminal until an admin intervenes.
    pub fn is_error(&self) -> bool {
        match self {
            Self::DownloadError | Self::AnnotationError => true,
            Self::Downloading
            | Self::NotAnnotated
            | Self::InProgress
            | Self::ProcessingClips
            | Self::Annotated => false,
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        use VideoStatus::*;
        match (self, next) {
            (Downloading, NotAnnotated | DownloadError) => true,
            (NotAnnotated, InProgress) => true,
            (InProgress, NotAnnotated) => true,
            // Fragment submission. `not_annotated` covers a save after the
            // lease expired; `annotated` and `annotation_error` cover
            // resubmission, which replaces the previous clip set.
            (NotAnnotated | InProgress | Annotated | AnnotationError, ProcessingClips | Annotated) => {
                true
            }
            (ProcessingClips, Annotated | AnnotationError) => true,
            (Annotated, AnnotationError) => true,
            _ => false,
        }
    }

    /// Check a transition, returning [`CoreError::InvalidState`] if illegal.
    pub fn ensure_transition(&self, next: VideoStatus) -> Result<(), CoreError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::InvalidState(format!(
                "Cannot move video from '{}' to '{}'",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

impl std::fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ClipStatus
// ---------------------------------------------------------------------------

/// Status of a derived clip inside its own extraction lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClipStatus {
    /// Created by a fragment submission, extraction not started.
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "processing")]
    Processing,
    /// Cut, uploaded and registered: ready to be annotated in the external tool.
    #[serde(rename = "not_annotated")]
    Ready,
    #[serde(rename = "clip_creation_failed")]
    ClipCreationFailed,
    #[serde(rename = "azure_upload_failed")]
    UploadFailed,
    #[serde(rename = "cvat_failed")]
    TaskCreationFailed,
    #[serde(rename = "processing_failed")]
    ProcessingFailed,
}

impl ClipStatus {
    pub const ALL: [ClipStatus; 7] = [
        Self::Pending,
        Self::Processing,
        Self::Ready,
        Self::ClipCreationFailed,
        Self::UploadFailed,
        Self::TaskCreationFailed,
        Self::ProcessingFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Ready => "not_annotated",
            Self::ClipCreationFailed => "clip_creation_failed",
            Self::UploadFailed => "azure_upload_failed",
            Self::TaskCreationFailed => "cvat_failed",
            Self::ProcessingFailed => "processing_failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown clip status: '{s}'")))
    }

    /// Whether the clip artifact exists in blob storage.
    pub fn has_artifact(&self) -> bool {
        match self {
            Self::Ready | Self::TaskCreationFailed => true,
            Self::Pending
            | Self::Processing
            | Self::ClipCreationFailed
            | Self::UploadFailed
            | Self::ProcessingFailed => false,
        }
    }
}

impl std::fmt::Display for ClipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
