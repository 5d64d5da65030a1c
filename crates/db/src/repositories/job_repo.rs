//! Repository for the `jobs` table.
//!
//! Status transitions are guarded in the `WHERE` clause of a single
//! statement, so a transition either happens atomically or reports that the
//! row was not in the expected state. Unknown ids are never an error.

use chrono::Utc;
use genq_core::progress::ProgressSnapshot;
use genq_core::types::DbId;
use serde_json::json;
use sqlx::types::Json;
use sqlx::SqliteConnection;

use crate::models::job::{Job, JobListQuery, QueueCounts};
use crate::models::status::JobStatus;
use crate::DbPool;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, payload, status, created_at, started_at, finished_at, \
    result, progress, retry_count";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 500;

/// SQLite treats a negative `LIMIT` as "no limit".
const NO_LIMIT: i64 = -1;

/// Provides queue operations over background jobs.
pub struct JobRepo;

impl JobRepo {
    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Insert a new queued job and return the stored row.
    pub async fn enqueue(pool: &DbPool, payload: &serde_json::Value) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (payload, status, created_at, retry_count) \
             VALUES (?1, ?2, ?3, 0) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(Json(payload))
            .bind(JobStatus::Queued)
            .bind(Utc::now())
            .fetch_one(pool)
            .await
    }

    /// Atomically claim the oldest queued job and mark it running.
    ///
    /// The select and the transition are one `UPDATE ... RETURNING`
    /// statement. SQLite admits a single writer at a time, so two callers
    /// racing for the same row cannot both see it as queued: exactly one
    /// receives the job, the other gets the next one or `None`.
    ///
    /// The returned row is the job as it was before the claim: status
    /// `queued`, no `started_at`. The stored row is `running`.
    pub async fn claim_next(pool: &DbPool) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET status = ?1, started_at = ?2 \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status = ?3 \
                 ORDER BY created_at ASC, id ASC \
                 LIMIT 1 \
             ) \
             AND status = ?3 \
             RETURNING {COLUMNS}"
        );
        let claimed = sqlx::query_as::<_, Job>(&query)
            .bind(JobStatus::Running)
            .bind(Utc::now())
            .bind(JobStatus::Queued)
            .fetch_optional(pool)
            .await?;

        // Only status and started_at change on claim; everything else in the
        // RETURNING row already matches the pre-image.
        Ok(claimed.map(|job| Job {
            status: JobStatus::Queued,
            started_at: None,
            ..job
        }))
    }

    /// Mark a running job as done with its result payload.
    ///
    /// Only a running job can complete. Returns `false` when the job is
    /// unknown or already terminal; in particular a second call, or a call
    /// after the job was aborted, leaves the row untouched.
    pub async fn complete(
        pool: &DbPool,
        job_id: DbId,
        result: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE jobs \
             SET status = ?1, finished_at = ?2, result = ?3 \
             WHERE id = ?4 AND status = ?5",
        )
        .bind(JobStatus::Done)
        .bind(Utc::now())
        .bind(Json(result))
        .bind(job_id)
        .bind(JobStatus::Running)
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Mark a queued or running job as failed with `{"error": error}`.
    ///
    /// Returns `false` when the job is unknown or already terminal.
    pub async fn fail(pool: &DbPool, job_id: DbId, error: &str) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE jobs \
             SET status = ?1, finished_at = ?2, result = ?3 \
             WHERE id = ?4 AND status IN (?5, ?6)",
        )
        .bind(JobStatus::Failed)
        .bind(Utc::now())
        .bind(Json(json!({ "error": error })))
        .bind(job_id)
        .bind(JobStatus::Queued)
        .bind(JobStatus::Running)
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    /// Cancel a queued job.
    ///
    /// Returns `false`, leaving the row unchanged, when the job is unknown,
    /// running, or terminal. Running jobs are only stopped through
    /// [`JobRepo::abort`].
    pub async fn cancel(pool: &DbPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        Self::transition_to_cancelled(pool, job_id, JobStatus::Queued).await
    }

    /// Administrative override: move a running job to cancelled.
    ///
    /// The worker cannot be interrupted mid-generation; it notices the
    /// cancellation at its next checkpoint and discards its work. Returns
    /// `false` unless the job was running.
    pub async fn abort(pool: &DbPool, job_id: DbId) -> Result<bool, sqlx::Error> {
        Self::transition_to_cancelled(pool, job_id, JobStatus::Running).await
    }

    /// Overwrite the progress snapshot. No status change; writes against a
    /// finished job are accepted and ignored by readers.
    pub async fn update_progress(
        pool: &DbPool,
        job_id: DbId,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET progress = ?1 WHERE id = ?2")
            .bind(Json(snapshot))
            .bind(job_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    async fn transition_to_cancelled(
        pool: &DbPool,
        job_id: DbId,
        from: JobStatus,
    ) -> Result<bool, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE jobs \
             SET status = ?1, finished_at = ?2, result = ?3 \
             WHERE id = ?4 AND status = ?5",
        )
        .bind(JobStatus::Cancelled)
        .bind(Utc::now())
        .bind(Json(json!({ "cancelled": true, "from": from.as_str() })))
        .bind(job_id)
        .bind(from)
        .execute(pool)
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Orphan recovery primitives
    // -----------------------------------------------------------------------

    /// Fail every running job whose next retry would exceed
    /// `max_retry_count`. Increments `retry_count` on each.
    pub async fn fail_exhausted_orphans(
        conn: &mut SqliteConnection,
        max_retry_count: u32,
        error: &str,
    ) -> Result<u64, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE jobs \
             SET status = ?1, retry_count = retry_count + 1, \
                 finished_at = ?2, result = ?3 \
             WHERE status = ?4 AND retry_count + 1 > ?5",
        )
        .bind(JobStatus::Failed)
        .bind(Utc::now())
        .bind(Json(json!({ "error": error })))
        .bind(JobStatus::Running)
        .bind(i64::from(max_retry_count))
        .execute(conn)
        .await?;
        Ok(outcome.rows_affected())
    }

    /// Put every running job back in the queue for a fresh attempt,
    /// incrementing `retry_count` and clearing `started_at` and `progress`.
    pub async fn requeue_orphans(conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
        let outcome = sqlx::query(
            "UPDATE jobs \
             SET status = ?1, retry_count = retry_count + 1, \
                 started_at = NULL, progress = NULL \
             WHERE status = ?2",
        )
        .bind(JobStatus::Queued)
        .bind(JobStatus::Running)
        .execute(conn)
        .await?;
        Ok(outcome.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &DbPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Current status of a job. Used by the worker's cancellation checkpoints.
    pub async fn status_of(pool: &DbPool, id: DbId) -> Result<Option<JobStatus>, sqlx::Error> {
        sqlx::query_scalar::<_, JobStatus>("SELECT status FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List jobs newest first, optionally filtered by status.
    pub async fn list(pool: &DbPool, params: &JobListQuery) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params
            .limit
            .map_or(NO_LIMIT, |limit| limit.clamp(1, MAX_LIMIT));
        let offset = params.offset.unwrap_or(0).max(0);

        match params.status {
            Some(status) => {
                let query = format!(
                    "SELECT {COLUMNS} FROM jobs WHERE status = ?1 \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT ?2 OFFSET ?3"
                );
                sqlx::query_as::<_, Job>(&query)
                    .bind(status)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
            }
            None => {
                let query = format!(
                    "SELECT {COLUMNS} FROM jobs \
                     ORDER BY created_at DESC, id DESC \
                     LIMIT ?1 OFFSET ?2"
                );
                sqlx::query_as::<_, Job>(&query)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
            }
        }
    }

    /// Count jobs per status.
    pub async fn status_counts(pool: &DbPool) -> Result<QueueCounts, sqlx::Error> {
        let rows: Vec<(JobStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
                .fetch_all(pool)
                .await?;

        let mut counts = QueueCounts::default();
        for (status, count) in rows {
            counts.set(status, count);
        }
        Ok(counts)
    }
}
