use axum::routing::{get, post};
use axum::Router;

use crate::handlers::queue;
use crate::state::AppState;

/// Routes mounted at `/queue`.
///
/// ```text
/// GET    /                -> list_jobs
/// POST   /                -> enqueue
/// GET    /{id}            -> get_job
/// POST   /{id}/cancel     -> cancel_job
/// POST   /{id}/abort      -> abort_job
/// GET    /{id}/progress   -> get_progress
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(queue::list_jobs).post(queue::enqueue))
        .route("/{id}", get(queue::get_job))
        .route("/{id}/cancel", post(queue::cancel_job))
        .route("/{id}/abort", post(queue::abort_job))
        .route("/{id}/progress", get(queue::get_progress))
}
