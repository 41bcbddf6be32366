use axum::routing::post;
use axum::Router;

use crate::handlers::maintenance;
use crate::state::AppState;

/// Routes mounted at `/maintenance`.
pub fn router() -> Router<AppState> {
    Router::new().route("/sweep", post(maintenance::run_sweep))
}
