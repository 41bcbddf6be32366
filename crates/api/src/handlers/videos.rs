//! Handlers for the `/videos` resource.
//!
//! Registration, deletion and retries require an admin; fragment save
//! requires an annotator; reads require any authenticated user.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use clipflow_core::fragments::FragmentSubmission;
use clipflow_core::status::VideoStatus;
use clipflow_core::types::DbId;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::{RequireAdmin, RequireAnnotator};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterVideo {
    /// `account/container/blob` or a blob URL.
    pub storage_path: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoListQuery {
    pub status: Option<VideoStatus>,
}

// ---------------------------------------------------------------------------
// Registration and listing
// ---------------------------------------------------------------------------

/// POST /api/v1/videos
///
/// Register an uploaded blob and enqueue its download. Returns 201.
pub async fn register_video(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<RegisterVideo>,
) -> AppResult<impl IntoResponse> {
    if input.storage_path.trim().is_empty() {
        return Err(AppError::BadRequest("storage_path must not be empty".into()));
    }
    let registration = state.workflow().register_video(input.storage_path.trim()).await?;

    tracing::info!(
        video_id = registration.video.id,
        job_id = registration.job.id,
        user_id = admin.user_id,
        "Video registered",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: registration })))
}

/// GET /api/v1/videos
///
/// All videos, newest first, each with its lock status. Optional `status`
/// filter.
pub async fn list_videos(
    _auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<VideoListQuery>,
) -> AppResult<impl IntoResponse> {
    let videos = state.workflow().list_videos(params.status).await?;
    Ok(Json(DataResponse { data: videos }))
}

/// GET /api/v1/videos/{id}/status
pub async fn video_status(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(video_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let view = state.workflow().video_status(video_id).await?;
    Ok(Json(DataResponse { data: view }))
}

// ---------------------------------------------------------------------------
// Fragments
// ---------------------------------------------------------------------------

/// POST /api/v1/videos/{id}/fragments
///
/// Save the caller's fragment submission. The response carries the
/// extraction job id as `task_id` unless the submission was a skip.
pub async fn save_fragments(
    RequireAnnotator(user): RequireAnnotator,
    State(state): State<AppState>,
    Path(video_id): Path<DbId>,
    Json(submission): Json<FragmentSubmission>,
) -> AppResult<impl IntoResponse> {
    let result = state
        .workflow()
        .save_fragments(video_id, &user.holder(), &submission)
        .await?;
    Ok(Json(DataResponse { data: result }))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

/// POST /api/v1/videos/{id}/retry
///
/// Re-enqueue clip extraction for a video whose clips are already saved.
pub async fn retry_extraction(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(video_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.workflow().retry_extraction(video_id).await?;
    tracing::info!(video_id, job_id = job.id, user_id = admin.user_id, "Extraction retried");
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: job })))
}

/// DELETE /api/v1/videos/{id}
pub async fn delete_video(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(video_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let report = state.workflow().delete_video(video_id).await?;
    tracing::warn!(video_id, user_id = admin.user_id, "Video deleted by admin");
    Ok(Json(DataResponse { data: report }))
}
