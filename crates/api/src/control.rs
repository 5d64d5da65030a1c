//! Transport-independent queue operations.
//!
//! Every method is one or two short store calls; none of them touches the
//! inference pipeline, so they stay responsive while the worker is busy
//! generating.

use genq_core::error::CoreError;
use genq_core::generation::GenerationRequest;
use genq_core::progress::ProgressSnapshot;
use genq_core::types::{DbId, Timestamp};
use genq_db::models::job::{Job, JobListQuery, QueueCounts};
use genq_db::models::status::JobStatus;
use genq_db::repositories::{JobRepo, QueueStateRepo};
use genq_db::DbPool;
use serde::Serialize;

use crate::error::{AppError, AppResult};

/// Maximum prompt length echoed in a [`JobSummary`].
const SUMMARY_PROMPT_CHARS: usize = 120;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct EnqueueResponse {
    pub job_id: DbId,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub job_id: DbId,
    pub status: JobStatus,
}

/// A job as shown in listings: everything but the payload.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: DbId,
    pub status: JobStatus,
    /// Leading part of the request prompt, for display.
    pub prompt: Option<String>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub retry_count: i64,
    /// Error of a failed job.
    pub error: Option<String>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        let prompt = job
            .payload
            .0
            .get("prompt")
            .and_then(serde_json::Value::as_str)
            .map(|prompt| prompt.chars().take(SUMMARY_PROMPT_CHARS).collect());

        Self {
            id: job.id,
            status: job.status,
            prompt,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            retry_count: job.retry_count,
            error: job.error_message().map(str::to_string),
        }
    }
}

/// A job with its request, result and latest progress.
#[derive(Debug, Clone, Serialize)]
pub struct JobDetail {
    pub id: DbId,
    pub status: JobStatus,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub progress: Option<ProgressSnapshot>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub retry_count: i64,
}

impl From<Job> for JobDetail {
    fn from(job: Job) -> Self {
        let progress = job.progress_snapshot();
        Self {
            id: job.id,
            status: job.status,
            payload: job.payload.0,
            result: job.result.map(|r| r.0),
            progress,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            retry_count: job.retry_count,
        }
    }
}

/// Paused flag plus per-status counts.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStateView {
    pub paused: bool,
    pub counts: QueueCounts,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Queue operations bound to a pool.
#[derive(Clone, Copy)]
pub struct QueueControl<'a> {
    pool: &'a DbPool,
}

impl<'a> QueueControl<'a> {
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Validate and enqueue a generation request.
    ///
    /// The stored payload is the normalized request, with every default made
    /// explicit, so a retry re-runs exactly what was accepted. Invalid input
    /// is a [`CoreError::Validation`] and creates no row.
    pub async fn enqueue(&self, payload: &serde_json::Value) -> AppResult<EnqueueResponse> {
        let request = GenerationRequest::parse(payload)?;
        let job = JobRepo::enqueue(self.pool, &request.to_payload()).await?;

        tracing::info!(
            job_id = job.id,
            steps = request.inference_steps,
            images = request.number_of_images,
            "Job enqueued",
        );

        Ok(EnqueueResponse {
            job_id: job.id,
            status: job.status,
        })
    }

    pub async fn list_jobs(&self, query: &JobListQuery) -> AppResult<Vec<JobSummary>> {
        let jobs = JobRepo::list(self.pool, query).await?;
        Ok(jobs.iter().map(JobSummary::from).collect())
    }

    pub async fn get_job(&self, job_id: DbId) -> AppResult<JobDetail> {
        Ok(self.find(job_id).await?.into())
    }

    /// Cancel a queued job. Running and finished jobs are a conflict.
    pub async fn cancel_job(&self, job_id: DbId) -> AppResult<CancelResponse> {
        if JobRepo::cancel(self.pool, job_id).await? {
            tracing::info!(job_id, "Job cancelled");
            return Ok(CancelResponse {
                job_id,
                status: JobStatus::Cancelled,
            });
        }

        let status = self.status(job_id).await?;
        Err(CoreError::Conflict(format!(
            "Job {job_id} is {status} and cannot be cancelled; only queued jobs can be cancelled"
        ))
        .into())
    }

    /// Move a running job to cancelled. The worker discards its work at the
    /// next checkpoint; a generation already in progress still runs to its
    /// end.
    pub async fn abort_job(&self, job_id: DbId) -> AppResult<CancelResponse> {
        if JobRepo::abort(self.pool, job_id).await? {
            tracing::warn!(job_id, "Running job aborted");
            return Ok(CancelResponse {
                job_id,
                status: JobStatus::Cancelled,
            });
        }

        let status = self.status(job_id).await?;
        Err(CoreError::Conflict(format!(
            "Job {job_id} is {status}; only running jobs can be aborted"
        ))
        .into())
    }

    pub async fn set_paused(&self, paused: bool) -> AppResult<()> {
        QueueStateRepo::set_paused(self.pool, paused).await?;
        tracing::info!(paused, "Queue pause state changed");
        Ok(())
    }

    pub async fn get_paused(&self) -> AppResult<bool> {
        Ok(QueueStateRepo::is_paused(self.pool).await?)
    }

    /// Latest progress of a job. Finished jobs report none, whatever a late
    /// write may have left behind.
    pub async fn get_progress(&self, job_id: DbId) -> AppResult<Option<ProgressSnapshot>> {
        let job = self.find(job_id).await?;
        if job.status.is_terminal() {
            return Ok(None);
        }
        Ok(job.progress_snapshot())
    }

    pub async fn queue_stats(&self) -> AppResult<QueueStateView> {
        let paused = QueueStateRepo::is_paused(self.pool).await?;
        let counts = JobRepo::status_counts(self.pool).await?;
        Ok(QueueStateView { paused, counts })
    }

    // ---- private helpers ----

    async fn find(&self, job_id: DbId) -> AppResult<Job> {
        JobRepo::find_by_id(self.pool, job_id)
            .await?
            .ok_or_else(|| not_found(job_id))
    }

    async fn status(&self, job_id: DbId) -> AppResult<JobStatus> {
        JobRepo::status_of(self.pool, job_id)
            .await?
            .ok_or_else(|| not_found(job_id))
    }
}

fn not_found(job_id: DbId) -> AppError {
    CoreError::NotFound {
        entity: "Job",
        id: job_id,
    }
    .into()
}
