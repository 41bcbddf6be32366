//! Handlers for on-demand maintenance.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/maintenance/sweep
///
/// Run the recovery sweep inline. Sub-check failures are reported in the
/// body, so this always answers 200.
pub async fn run_sweep(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    tracing::info!(user_id = admin.user_id, "Maintenance sweep requested");
    let report = state.ctx.sweep().run().await;
    Ok(Json(DataResponse { data: report }))
}
