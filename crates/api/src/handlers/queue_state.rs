//! Handlers for queue-wide control state.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Serialize)]
pub struct PausedBody {
    pub paused: bool,
}

/// GET /api/v1/queue-state
///
/// Paused flag and the number of jobs in each status.
pub async fn get_queue_state(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let view = state.queue().queue_stats().await?;
    Ok(Json(DataResponse { data: view }))
}

/// PUT /api/v1/queue-state/paused
///
/// Body `{"paused": bool}`. Pausing stops new claims; a running job is not
/// affected.
pub async fn set_paused(
    State(state): State<AppState>,
    body: Result<Json<PausedBody>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(PausedBody { paused }) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let queue = state.queue();
    queue.set_paused(paused).await?;
    let paused = queue.get_paused().await?;
    Ok(Json(DataResponse {
        data: PausedBody { paused },
    }))
}
