//! Handler for the generated-results listing.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use genq_pipeline::DiskImageSaver;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/results
///
/// Files the worker has written to the results directory, names
/// descending. Empty until the first job completes.
pub async fn list_results(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let saver = DiskImageSaver::new(state.config.results_dir.clone());
    let entries = saver
        .list_results()
        .await
        .map_err(|e| AppError::InternalError(format!("listing results: {e}")))?;
    Ok(Json(DataResponse { data: entries }))
}
