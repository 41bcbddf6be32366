use axum::routing::{delete, post};
use axum::Router;

use crate::handlers::locks;
use crate::state::AppState;

/// Routes mounted at `/locks`.
///
/// ```text
/// DELETE /           -> force_release_all
/// POST   /status     -> batch_lock_status
/// POST   /sweep      -> sweep_locks
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", delete(locks::force_release_all))
        .route("/status", post(locks::batch_lock_status))
        .route("/sweep", post(locks::sweep_locks))
}
