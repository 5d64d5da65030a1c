pub mod health;
pub mod queue;
pub mod queue_state;
pub mod results;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /queue                          list, enqueue
/// /queue/{id}                     get
/// /queue/{id}/cancel              cancel a queued job (POST)
/// /queue/{id}/abort               abort a running job (POST)
/// /queue/{id}/progress            latest progress snapshot
///
/// /queue-state                    paused flag and status counts
/// /queue-state/paused             set paused flag (PUT)
///
/// /results                        generated files on disk
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/queue", queue::router())
        .nest("/queue-state", queue_state::router())
        .nest("/results", results::router())
}
