use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::{locks, videos};
use crate::state::AppState;

/// Routes mounted at `/videos`.
///
/// ```text
/// GET    /                  -> list_videos
/// POST   /                  -> register_video
/// DELETE /{id}              -> delete_video
/// GET    /{id}/status       -> video_status
/// GET    /{id}/lock         -> lock_status
/// POST   /{id}/lock         -> lock_video
/// DELETE /{id}/lock         -> unlock_video
/// POST   /{id}/fragments    -> save_fragments
/// POST   /{id}/retry        -> retry_extraction
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(videos::list_videos).post(videos::register_video))
        .route("/{id}", delete(videos::delete_video))
        .route("/{id}/status", get(videos::video_status))
        .route(
            "/{id}/lock",
            get(locks::lock_status)
                .post(locks::lock_video)
                .delete(locks::unlock_video),
        )
        .route("/{id}/fragments", post(videos::save_fragments))
        .route("/{id}/retry", post(videos::retry_extraction))
}
