//! Startup recovery of jobs left `running` by a previous process.
//!
//! Only one worker drains the queue, so at startup every `running` row is an
//! orphan. Each one gets its retry count bumped and goes back to `queued`,
//! unless that would exceed the retry ceiling, in which case it is failed so
//! a poisoned payload cannot crash-loop the worker forever.

use genq_db::repositories::JobRepo;
use genq_db::DbPool;

/// Rows touched by [`recover_orphaned_jobs`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub requeued: u64,
    pub failed: u64,
}

impl RecoveryReport {
    pub fn total(&self) -> u64 {
        self.requeued + self.failed
    }
}

/// Error recorded on an orphan that ran out of retries.
pub fn retry_limit_message(max_retry_count: u32) -> String {
    format!("Job interrupted by process restart; retry limit ({max_retry_count}) exceeded")
}

/// Requeue or fail every orphaned `running` job, in one transaction.
pub async fn recover_orphaned_jobs(
    pool: &DbPool,
    max_retry_count: u32,
) -> Result<RecoveryReport, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let failed = JobRepo::fail_exhausted_orphans(
        &mut tx,
        max_retry_count,
        &retry_limit_message(max_retry_count),
    )
    .await?;
    let requeued = JobRepo::requeue_orphans(&mut tx).await?;

    tx.commit().await?;

    let report = RecoveryReport { requeued, failed };
    if report.total() > 0 {
        tracing::warn!(
            requeued = report.requeued,
            failed = report.failed,
            max_retry_count,
            "Recovered orphaned jobs",
        );
    } else {
        tracing::debug!("No orphaned jobs found");
    }
    Ok(report)
}
