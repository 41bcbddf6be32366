//! Handlers for video annotation locks.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use clipflow_core::types::DbId;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::{RequireAdmin, RequireAnnotator, RequireSuperAdmin};
use crate::response::DataResponse;
use crate::state::AppState;

/// Upper bound on ids accepted by one batch status request.
const MAX_BATCH_IDS: usize = 500;

#[derive(Debug, Deserialize)]
pub struct BatchStatusRequest {
    pub video_ids: Vec<DbId>,
}

#[derive(Debug, Serialize)]
pub struct LocksRemoved {
    pub removed: usize,
}

/// POST /api/v1/videos/{id}/lock
///
/// Acquire (or refresh) the caller's lock and move the video to
/// `in_progress`. 409 with the current holder when someone else has it.
pub async fn lock_video(
    RequireAnnotator(user): RequireAnnotator,
    State(state): State<AppState>,
    Path(video_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let grant = state.workflow().lock_video(video_id, &user.holder()).await?;
    Ok(Json(DataResponse { data: grant }))
}

/// DELETE /api/v1/videos/{id}/lock
pub async fn unlock_video(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(video_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let result = state.workflow().unlock_video(video_id, auth.user_id).await?;
    Ok(Json(DataResponse { data: result }))
}

/// GET /api/v1/videos/{id}/lock
pub async fn lock_status(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(video_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let status = state.workflow().lock_status(video_id).await?;
    Ok(Json(DataResponse { data: status }))
}

/// POST /api/v1/locks/status
///
/// Lock status for many videos in one round trip, in request order.
pub async fn batch_lock_status(
    _auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<BatchStatusRequest>,
) -> AppResult<impl IntoResponse> {
    if input.video_ids.len() > MAX_BATCH_IDS {
        return Err(AppError::BadRequest(format!(
            "At most {MAX_BATCH_IDS} video ids per request"
        )));
    }
    let statuses = state.workflow().batch_lock_status(&input.video_ids).await?;
    Ok(Json(DataResponse { data: statuses }))
}

/// POST /api/v1/locks/sweep
///
/// Remove lock keys that have no expiry or an unreadable payload.
pub async fn sweep_locks(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let removed = state.ctx.locks().sweep_expired().await?;
    tracing::info!(removed, user_id = admin.user_id, "Lock sweep requested");
    Ok(Json(DataResponse {
        data: LocksRemoved { removed },
    }))
}

/// DELETE /api/v1/locks
///
/// Drop every video lock regardless of holder.
pub async fn force_release_all(
    RequireSuperAdmin(admin): RequireSuperAdmin,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let removed = state.ctx.locks().force_release_all(admin.user_id).await?;
    Ok(Json(DataResponse {
        data: LocksRemoved { removed },
    }))
}
