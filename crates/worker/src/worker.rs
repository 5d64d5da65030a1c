//! The queue worker loop.
//!
//! One iteration claims at most one job and carries it through
//! parse, generate, save and commit while holding the pipeline lock. The
//! generate call cannot be interrupted, so cancellation is observed at three
//! checkpoints instead:
//!
//! - before taking the pipeline (nothing generated yet),
//! - after generation returns (output discarded, nothing saved),
//! - after saving (nothing committed).
//!
//! A job cancelled at any checkpoint is left exactly as the canceller wrote
//! it.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use genq_core::config::QueueConfig;
use genq_core::generation::GenerationRequest;
use genq_core::progress::{ProgressPhase, ProgressSnapshot};
use genq_core::types::DbId;
use genq_db::models::job::Job;
use genq_db::models::status::JobStatus;
use genq_db::repositories::{JobRepo, QueueStateRepo};
use genq_db::DbPool;
use genq_pipeline::{
    GeneratedImage, ImageGenerator, ImageSaver, PipelineError, PipelineLock, ProgressReporter,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::error::WorkerError;
use crate::recovery::recover_orphaned_jobs;

/// Error recorded when a generator returns nothing and gives no reason.
pub const NO_IMAGES_ERROR: &str = "no images generated";

/// What a single [`QueueWorker::run_once`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// The queue is paused; nothing was claimed.
    Paused,
    /// No queued job was available.
    Idle,
    Completed(DbId),
    Failed(DbId),
    /// The job was cancelled while in flight and left untouched.
    Cancelled(DbId),
}

/// Drains the queue one job at a time through a shared pipeline.
pub struct QueueWorker<G, S> {
    pool: DbPool,
    pipeline: PipelineLock<G>,
    saver: S,
    config: QueueConfig,
}

impl<G, S> QueueWorker<G, S>
where
    G: ImageGenerator,
    S: ImageSaver,
{
    pub fn new(pool: DbPool, pipeline: PipelineLock<G>, saver: S, config: QueueConfig) -> Self {
        Self {
            pool,
            pipeline,
            saver,
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Recover orphans, then work the queue until `shutdown` fires.
    ///
    /// Shutdown is only observed between iterations; a job in flight always
    /// runs to its end. Only a failed recovery returns an error.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), WorkerError> {
        let report = recover_orphaned_jobs(&self.pool, self.config.max_retry_count).await?;
        tracing::info!(
            recovered = report.total(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            max_retry_count = self.config.max_retry_count,
            "Queue worker started",
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let delay = match self.run_once().await {
                Ok(IterationOutcome::Paused) | Ok(IterationOutcome::Idle) => {
                    Some(self.config.poll_interval)
                }
                Ok(_) => None,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        backoff_ms = self.config.error_backoff.as_millis() as u64,
                        "Worker iteration failed",
                    );
                    Some(self.config.error_backoff)
                }
            };

            if let Some(delay) = delay {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        tracing::info!("Queue worker shutting down");
        Ok(())
    }

    /// Run a single iteration: claim the oldest queued job, if any, and
    /// carry it to a terminal state.
    ///
    /// A storage error after the claim fails that job (best effort) before
    /// being returned.
    pub async fn run_once(&self) -> Result<IterationOutcome, WorkerError> {
        if QueueStateRepo::is_paused(&self.pool).await? {
            return Ok(IterationOutcome::Paused);
        }

        let Some(job) = JobRepo::claim_next(&self.pool).await? else {
            return Ok(IterationOutcome::Idle);
        };
        tracing::info!(job_id = job.id, retry_count = job.retry_count, "Job claimed");

        match self.process_claimed(&job).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let message = format!("Worker error: {e}");
                if let Err(fail_err) = JobRepo::fail(&self.pool, job.id, &message).await {
                    tracing::error!(
                        job_id = job.id,
                        error = %fail_err,
                        "Failed to mark job failed after worker error",
                    );
                }
                Err(e)
            }
        }
    }

    /// Carry a job this worker already claimed to a terminal state, or
    /// leave it alone if it gets cancelled along the way.
    ///
    /// Storage errors are returned without touching the job;
    /// [`run_once`](Self::run_once) is the caller that fails it.
    pub async fn process_claimed(&self, job: &Job) -> Result<IterationOutcome, WorkerError> {
        let job_id = job.id;
        self.write_progress(job_id, &ProgressSnapshot::new(ProgressPhase::Validating))
            .await;

        let request = match GenerationRequest::parse(&job.payload.0) {
            Ok(request) => request,
            Err(e) => return self.fail_job(job_id, &e.to_string()).await,
        };

        // Checkpoint A: a cancel that raced the claim.
        if self.is_cancelled(job_id).await? {
            tracing::info!(job_id, "Job cancelled before generation");
            return Ok(IterationOutcome::Cancelled(job_id));
        }

        let mut generator = self.pipeline.acquire().await;

        self.write_progress(job_id, &ProgressSnapshot::new(ProgressPhase::LoadingModel))
            .await;
        if let Err(e) = guarded(generator.prepare(&request)).await {
            return self.fail_job(job_id, &e.to_string()).await;
        }

        self.write_progress(job_id, &ProgressSnapshot::steps(0, request.total_steps()))
            .await;
        let started = Instant::now();
        let generated = self
            .generate_with_progress(job_id, &mut *generator, &request)
            .await;
        let latency = started.elapsed().as_secs_f64();

        // Checkpoint B: discard output of a job aborted mid-generation.
        if self.is_cancelled(job_id).await? {
            tracing::info!(job_id, latency, "Job cancelled during generation; output discarded");
            return Ok(IterationOutcome::Cancelled(job_id));
        }

        let images = match generated {
            Ok(Some(images)) if !images.is_empty() => images,
            Ok(_) => {
                let error = generator
                    .last_error()
                    .unwrap_or_else(|| NO_IMAGES_ERROR.to_string());
                return self.fail_job(job_id, &error).await;
            }
            Err(e) => return self.fail_job(job_id, &e.to_string()).await,
        };

        self.write_progress(job_id, &ProgressSnapshot::new(ProgressPhase::Saving))
            .await;
        let saved = match guarded(self.saver.save(&images, &request)).await {
            Ok(saved) => saved,
            Err(e) => return self.fail_job(job_id, &e.to_string()).await,
        };

        // Checkpoint C: cancellation raced the save.
        if self.is_cancelled(job_id).await? {
            tracing::info!(job_id, "Job cancelled during save; not committed");
            return Ok(IterationOutcome::Cancelled(job_id));
        }

        let result = json!({
            "saved": saved,
            "latency": round_latency(latency),
        });
        if !JobRepo::complete(&self.pool, job_id, &result).await? {
            tracing::info!(job_id, "Job left running state before commit; result discarded");
            return Ok(IterationOutcome::Cancelled(job_id));
        }

        tracing::info!(job_id, images = saved.len(), latency, "Job completed");
        Ok(IterationOutcome::Completed(job_id))
    }

    /// Drive the generator while forwarding its step reports to the store.
    async fn generate_with_progress(
        &self,
        job_id: DbId,
        generator: &mut G,
        request: &GenerationRequest,
    ) -> Result<Option<Vec<GeneratedImage>>, PipelineError> {
        let (reporter, mut updates) = ProgressReporter::channel();

        let result = {
            let generation = guarded(generator.generate(request, &reporter));
            tokio::pin!(generation);
            loop {
                tokio::select! {
                    result = &mut generation => break result,
                    Some(snapshot) = updates.recv() => {
                        self.write_progress(job_id, &snapshot).await;
                    }
                }
            }
        };

        drop(reporter);
        let mut last = None;
        while let Ok(snapshot) = updates.try_recv() {
            last = Some(snapshot);
        }
        if let Some(snapshot) = last {
            self.write_progress(job_id, &snapshot).await;
        }

        result
    }

    async fn fail_job(&self, job_id: DbId, error: &str) -> Result<IterationOutcome, WorkerError> {
        if JobRepo::fail(&self.pool, job_id, error).await? {
            tracing::warn!(job_id, error, "Job failed");
            Ok(IterationOutcome::Failed(job_id))
        } else {
            tracing::info!(job_id, error, "Job left running state before failure was recorded");
            Ok(IterationOutcome::Cancelled(job_id))
        }
    }

    async fn is_cancelled(&self, job_id: DbId) -> Result<bool, WorkerError> {
        let status = JobRepo::status_of(&self.pool, job_id).await?;
        Ok(status == Some(JobStatus::Cancelled))
    }

    /// Progress is observability only; a failed write never fails the job.
    async fn write_progress(&self, job_id: DbId, snapshot: &ProgressSnapshot) {
        if let Err(e) = JobRepo::update_progress(&self.pool, job_id, snapshot).await {
            tracing::warn!(job_id, error = %e, "Failed to write job progress");
        }
    }
}

/// Await a collaborator call, turning a panic into a [`PipelineError`].
async fn guarded<T, F>(call: F) -> Result<T, PipelineError>
where
    F: std::future::Future<Output = Result<T, PipelineError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(PipelineError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn round_latency(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}
