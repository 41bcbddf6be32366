//! Fragment submissions: the time ranges an annotator marks per ML project.
//!
//! [`plan_clips`] validates a whole submission up front and turns it into
//! [`ClipSpec`]s. Nothing is persisted unless every range passes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Default minimum clip duration, inclusive.
pub const DEFAULT_MIN_CLIP_DURATION_SECS: f64 = 1.0;

/// Upper bound on `image_quality` accepted by the annotation tool.
pub const MAX_IMAGE_QUALITY: i32 = 100;

// ---------------------------------------------------------------------------
// Submission DTOs
// ---------------------------------------------------------------------------

/// Target project parameters forwarded to the annotation tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectParams {
    pub project_id: DbId,
    pub overlap: i32,
    pub segment_size: i32,
    pub image_quality: i32,
}

/// One marked time range, as `HH:MM:SS` timecodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentRange {
    pub start: String,
    pub end: String,
}

/// All ranges marked for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFragments {
    #[serde(flatten)]
    pub params: ProjectParams,
    #[serde(default)]
    pub clips: Vec<FragmentRange>,
}

/// The annotator's complete submission for one source video.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentSubmission {
    /// Mark the video annotated without producing any clips.
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub projects: Vec<ProjectFragments>,
}

/// A validated clip ready to be persisted as a pending clip record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipSpec {
    pub params: ProjectParams,
    /// Ordinal of the clip within its project (0-based).
    pub clip_index: i32,
    pub start_offset_secs: f64,
    pub duration_secs: f64,
}

impl ClipSpec {
    pub fn end_secs(&self) -> f64 {
        self.start_offset_secs + self.duration_secs
    }
}

// ---------------------------------------------------------------------------
// Timecodes
// ---------------------------------------------------------------------------

/// Parse `HH:MM:SS`, `MM:SS` or `SS`, each optionally with fractional seconds.
pub fn parse_timecode(raw: &str) -> Result<f64, CoreError> {
    let invalid = || CoreError::Validation(format!("Invalid timecode '{raw}', expected HH:MM:SS"));

    let parts: Vec<&str> = raw.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(invalid());
    }

    let (secs_part, whole_parts) = parts.split_last().ok_or_else(invalid)?;
    let seconds: f64 = secs_part.parse().map_err(|_| invalid())?;
    if !seconds.is_finite() || seconds < 0.0 || (!whole_parts.is_empty() && seconds >= 60.0) {
        return Err(invalid());
    }

    let mut total = 0.0;
    for (pos, part) in whole_parts.iter().enumerate() {
        let value: u32 = part.parse().map_err(|_| invalid())?;
        // Minutes (the last whole part when hours are present) must be < 60.
        let is_minutes = pos == whole_parts.len() - 1;
        if is_minutes && value >= 60 {
            return Err(invalid());
        }
        total = total * 60.0 + f64::from(value);
    }

    Ok(total * 60.0 + seconds)
}

/// Format seconds as `HH:MM:SS`, adding `.mmm` only for fractional values.
pub fn format_timecode(secs: f64) -> String {
    let secs = secs.max(0.0);
    let total_millis = (secs * 1000.0).round() as u64;
    let millis = total_millis % 1000;
    let whole = total_millis / 1000;
    let (h, m, s) = (whole / 3600, (whole % 3600) / 60, whole % 60);
    if millis == 0 {
        format!("{h:02}:{m:02}:{s:02}")
    } else {
        format!("{h:02}:{m:02}:{s:02}.{millis:03}")
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_params(params: &ProjectParams) -> Result<(), CoreError> {
    let project_id = params.project_id;
    if project_id <= 0 {
        return Err(CoreError::Validation(format!(
            "project_id must be positive, got {project_id}"
        )));
    }
    if params.overlap < 0 {
        return Err(CoreError::Validation(format!(
            "Project {project_id}: overlap must not be negative"
        )));
    }
    if params.segment_size <= 0 {
        return Err(CoreError::Validation(format!(
            "Project {project_id}: segment_size must be positive"
        )));
    }
    if !(0..=MAX_IMAGE_QUALITY).contains(&params.image_quality) {
        return Err(CoreError::Validation(format!(
            "Project {project_id}: image_quality must be between 0 and {MAX_IMAGE_QUALITY}"
        )));
    }
    Ok(())
}

/// Validate a submission and expand it into clip specs.
///
/// Any invalid range rejects the entire submission; the error names the
/// project and the 1-based clip number. A skip submission yields no clips
/// regardless of its ranges.
pub fn plan_clips(
    submission: &FragmentSubmission,
    min_duration_secs: f64,
) -> Result<Vec<ClipSpec>, CoreError> {
    if submission.skip {
        return Ok(Vec::new());
    }

    let mut seen_projects = HashSet::new();
    let mut specs = Vec::new();

    for project in &submission.projects {
        let params = project.params;
        validate_params(&params)?;
        if !seen_projects.insert(params.project_id) {
            return Err(CoreError::Validation(format!(
                "Project {} appears more than once in the submission",
                params.project_id
            )));
        }

        for (index, range) in project.clips.iter().enumerate() {
            let clip_no = index + 1;
            let start = parse_timecode(&range.start).map_err(|e| {
                CoreError::Validation(format!(
                    "Project {}, clip {clip_no}: {e}",
                    params.project_id
                ))
            })?;
            let end = parse_timecode(&range.end).map_err(|e| {
                CoreError::Validation(format!(
                    "Project {}, clip {clip_no}: {e}",
                    params.project_id
                ))
            })?;

            if end < start {
                return Err(CoreError::Validation(format!(
                    "Project {}, clip {clip_no}: end {} is before start {}",
                    params.project_id, range.end, range.start
                )));
            }

            let duration = end - start;
            if duration < min_duration_secs {
                return Err(CoreError::Validation(format!(
                    "Project {}, clip {clip_no}: duration {duration:.3}s is shorter than the \
                     {min_duration_secs}s minimum ({} - {})",
                    params.project_id, range.start, range.end
                )));
            }

            specs.push(ClipSpec {
                params,
                clip_index: index as i32,
                start_offset_secs: start,
                duration_secs: duration,
            });
        }
    }

    Ok(specs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
