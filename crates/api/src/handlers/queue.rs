//! Handlers for the `/queue` resource.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use genq_core::types::DbId;
use genq_db::models::job::JobListQuery;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Enqueue
// ---------------------------------------------------------------------------

/// POST /api/v1/queue
///
/// Enqueue a generation request. Returns 201 with `{job_id, status}`;
/// an invalid request is a 400 and creates no job.
pub async fn enqueue(
    State(state): State<AppState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(payload) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let created = state.queue().enqueue(&payload).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// GET /api/v1/queue
///
/// List jobs newest first. Supports optional `status`, `limit` and
/// `offset` query parameters.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.queue().list_jobs(&params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/queue/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.queue().get_job(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/v1/queue/{id}/progress
///
/// `data` is `null` when nothing was reported yet or the job has finished.
pub async fn get_progress(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let progress = state.queue().get_progress(job_id).await?;
    Ok(Json(DataResponse { data: progress }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/queue/{id}/cancel
///
/// Cancel a queued job. 404 for unknown jobs, 409 for any other state.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let cancelled = state.queue().cancel_job(job_id).await?;
    Ok(Json(DataResponse { data: cancelled }))
}

/// POST /api/v1/queue/{id}/abort
///
/// Administrative override for a running job. The worker drops the job at
/// its next checkpoint. 409 unless the job is running.
pub async fn abort_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let aborted = state.queue().abort_job(job_id).await?;
    Ok(Json(DataResponse { data: aborted }))
}
