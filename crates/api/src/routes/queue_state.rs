use axum::routing::{get, put};
use axum::Router;

use crate::handlers::queue_state;
use crate::state::AppState;

/// Routes mounted at `/queue-state`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(queue_state::get_queue_state))
        .route("/paused", put(queue_state::set_paused))
}
