use axum::extract::State;
use axum::http::StatusCode;
use axum::{routing::get, Json, Router};
use clipflow_pipeline::recovery::HealthSnapshot;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` when every backing store answers, `degraded` otherwise.
    pub status: &'static str,
    pub version: &'static str,
    #[serde(flatten)]
    pub components: HealthSnapshot,
}

/// GET /health -- record store and lock store connectivity.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let components = state.ctx.sweep().health().await;
    let (code, status) = if components.healthy() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            components,
        }),
    )
}

/// Mount health check routes (root level, not under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
