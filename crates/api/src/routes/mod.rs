pub mod health;
pub mod jobs;
pub mod locks;
pub mod maintenance;
pub mod videos;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /videos                      list, register (admin)
/// /videos/{id}                 delete (admin)
/// /videos/{id}/status          status + ready_for_annotation
/// /videos/{id}/lock            lock (annotator), unlock, lock status
/// /videos/{id}/fragments       save fragments (annotator)
/// /videos/{id}/retry           retry extraction (admin)
///
/// /locks                       force-release all (super admin)
/// /locks/status                batch lock status
/// /locks/sweep                 remove anomalous lock keys (admin)
///
/// /jobs/{id}                   background job status
///
/// /maintenance/sweep           run the recovery sweep (admin)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/videos", videos::router())
        .nest("/locks", locks::router())
        .nest("/jobs", jobs::router())
        .nest("/maintenance", maintenance::router())
}
