//! Job entity model and query DTOs.

use genq_core::progress::ProgressSnapshot;
use genq_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use super::status::JobStatus;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    /// Client-owned generation request, never mutated after insert.
    pub payload: Json<serde_json::Value>,
    pub status: JobStatus,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub result: Option<Json<serde_json::Value>>,
    pub progress: Option<Json<serde_json::Value>>,
    pub retry_count: i64,
}

impl Job {
    /// The stored progress snapshot, if one was written and is readable.
    pub fn progress_snapshot(&self) -> Option<ProgressSnapshot> {
        self.progress
            .as_ref()
            .and_then(|Json(value)| ProgressSnapshot::from_json(value))
    }

    /// The `error` string of a failed job's result.
    pub fn error_message(&self) -> Option<&str> {
        self.result
            .as_ref()
            .and_then(|Json(value)| value.get("error"))
            .and_then(serde_json::Value::as_str)
    }
}

/// Query parameters for listing jobs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListQuery {
    /// Only return jobs in this status.
    pub status: Option<JobStatus>,
    /// Maximum number of results. Unlimited when absent, capped at 500.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Number of jobs in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub queued: i64,
    pub running: i64,
    pub done: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl QueueCounts {
    pub fn set(&mut self, status: JobStatus, count: i64) {
        match status {
            JobStatus::Queued => self.queued = count,
            JobStatus::Running => self.running = count,
            JobStatus::Done => self.done = count,
            JobStatus::Failed => self.failed = count,
            JobStatus::Cancelled => self.cancelled = count,
        }
    }

    pub fn total(&self) -> i64 {
        self.queued + self.running + self.done + self.failed + self.cancelled
    }
}
