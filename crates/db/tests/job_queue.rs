//! Integration tests for the durable queue store.
//!
//! Each test gets a fresh SQLite database with the workspace migrations
//! applied.

use assert_matches::assert_matches;
use genq_core::progress::{ProgressPhase, ProgressSnapshot};
use genq_db::models::job::JobListQuery;
use genq_db::models::status::JobStatus;
use genq_db::repositories::{JobRepo, QueueStateRepo};
use serde_json::json;
use sqlx::SqlitePool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn payload(prompt: &str) -> serde_json::Value {
    json!({ "prompt": prompt, "steps": 1 })
}

/// Enqueue a job and drive it into `running`.
async fn running_job(pool: &SqlitePool, prompt: &str) -> i64 {
    let job = JobRepo::enqueue(pool, &payload(prompt)).await.unwrap();
    let claimed = JobRepo::claim_next(pool).await.unwrap().unwrap();
    assert_eq!(claimed.id, job.id, "expected the only queued job to be claimed");
    job.id
}

async fn status(pool: &SqlitePool, id: i64) -> JobStatus {
    JobRepo::status_of(pool, id).await.unwrap().unwrap()
}

// ---------------------------------------------------------------------------
// Enqueue
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn enqueue_assigns_strictly_increasing_ids(pool: SqlitePool) {
    let mut previous = 0;
    for i in 0..20 {
        let job = JobRepo::enqueue(&pool, &payload(&format!("p{i}")))
            .await
            .unwrap();
        assert!(job.id > previous, "id {} not greater than {previous}", job.id);
        previous = job.id;
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn enqueue_creates_queued_row_with_defaults(pool: SqlitePool) {
    let job = JobRepo::enqueue(&pool, &payload("a")).await.unwrap();

    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.payload.0, payload("a"));
    assert!(job.started_at.is_none());
    assert!(job.finished_at.is_none());
    assert!(job.result.is_none());
    assert!(job.progress.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn ids_are_not_reused(pool: SqlitePool) {
    let first = JobRepo::enqueue(&pool, &payload("a")).await.unwrap();
    sqlx::query("DELETE FROM jobs WHERE id = ?1")
        .bind(first.id)
        .execute(&pool)
        .await
        .unwrap();

    let second = JobRepo::enqueue(&pool, &payload("b")).await.unwrap();
    assert!(second.id > first.id);
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_on_empty_queue_returns_none(pool: SqlitePool) {
    assert!(JobRepo::claim_next(&pool).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_is_fifo_and_marks_running(pool: SqlitePool) {
    let a = JobRepo::enqueue(&pool, &payload("a")).await.unwrap();
    let b = JobRepo::enqueue(&pool, &payload("b")).await.unwrap();

    let first = JobRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_eq!(first.id, a.id);
    assert_eq!(first.payload.0, payload("a"));

    let stored = JobRepo::find_by_id(&pool, a.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Running);
    let started = stored.started_at.expect("claim sets started_at");
    assert!(started >= stored.created_at);

    let second = JobRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_eq!(second.id, b.id);

    assert!(JobRepo::claim_next(&pool).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_returns_the_row_as_it_was_before_the_claim(pool: SqlitePool) {
    let queued = JobRepo::enqueue(&pool, &payload("pre")).await.unwrap();

    let claimed = JobRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_eq!(claimed.id, queued.id);
    assert_eq!(claimed.status, JobStatus::Queued);
    assert_eq!(claimed.started_at, None);
    assert_eq!(claimed.created_at, queued.created_at);
    assert_eq!(claimed.retry_count, 0);

    assert_eq!(status(&pool, queued.id).await, JobStatus::Running);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn claim_skips_cancelled_jobs(pool: SqlitePool) {
    let a = JobRepo::enqueue(&pool, &payload("a")).await.unwrap();
    let b = JobRepo::enqueue(&pool, &payload("b")).await.unwrap();
    assert!(JobRepo::cancel(&pool, a.id).await.unwrap());

    let claimed = JobRepo::claim_next(&pool).await.unwrap().unwrap();
    assert_eq!(claimed.id, b.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_claimers_get_a_single_job_once(pool: SqlitePool) {
    let job = JobRepo::enqueue(&pool, &payload("only")).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { JobRepo::claim_next(&pool).await })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        if let Some(claimed) = handle.await.unwrap().unwrap() {
            winners.push(claimed.id);
        }
    }

    assert_eq!(winners, vec![job.id], "exactly one claimer must win");
    assert_eq!(status(&pool, job.id).await, JobStatus::Running);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_claimers_never_share_jobs(pool: SqlitePool) {
    for i in 0..10 {
        JobRepo::enqueue(&pool, &payload(&format!("p{i}")))
            .await
            .unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let mut mine = Vec::new();
                while let Some(job) = JobRepo::claim_next(&pool).await.unwrap() {
                    mine.push(job.id);
                }
                mine
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    all.sort_unstable();
    let before = all.len();
    all.dedup();

    assert_eq!(before, 10);
    assert_eq!(all.len(), 10, "a job was handed to two claimers");
}

// ---------------------------------------------------------------------------
// Complete / fail
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn complete_sets_terminal_fields(pool: SqlitePool) {
    let id = running_job(&pool, "a").await;
    let result = json!({ "saved": ["x-1.png"], "latency": 1.5 });

    assert!(JobRepo::complete(&pool, id, &result).await.unwrap());

    let job = JobRepo::find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.result.unwrap().0, result);
    let finished = job.finished_at.unwrap();
    let started = job.started_at.unwrap();
    assert!(finished >= started);
    assert!(started >= job.created_at);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn second_complete_is_a_no_op(pool: SqlitePool) {
    let id = running_job(&pool, "a").await;
    let first_result = json!({ "saved": ["first.png"] });

    assert!(JobRepo::complete(&pool, id, &first_result).await.unwrap());
    let after_first = JobRepo::find_by_id(&pool, id).await.unwrap().unwrap();

    let second = JobRepo::complete(&pool, id, &json!({ "saved": ["second.png"] }))
        .await
        .unwrap();
    assert!(!second, "completing a terminal job must be refused");

    let after_second = JobRepo::find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(after_second.status, JobStatus::Done);
    assert_eq!(after_second.result.unwrap().0, first_result);
    assert_eq!(after_second.finished_at, after_first.finished_at);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn complete_unknown_job_is_a_no_op(pool: SqlitePool) {
    assert!(!JobRepo::complete(&pool, 9999, &json!({})).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn fail_records_error(pool: SqlitePool) {
    let id = running_job(&pool, "a").await;

    assert!(JobRepo::fail(&pool, id, "boom").await.unwrap());

    let job = JobRepo::find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_message(), Some("boom"));
    assert!(job.finished_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn fail_does_not_touch_terminal_jobs(pool: SqlitePool) {
    let id = running_job(&pool, "a").await;
    JobRepo::complete(&pool, id, &json!({ "saved": [] }))
        .await
        .unwrap();

    assert!(!JobRepo::fail(&pool, id, "late").await.unwrap());
    assert_eq!(status(&pool, id).await, JobStatus::Done);
}

// ---------------------------------------------------------------------------
// Cancel / abort
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn cancel_queued_job_succeeds(pool: SqlitePool) {
    let job = JobRepo::enqueue(&pool, &payload("a")).await.unwrap();

    assert!(JobRepo::cancel(&pool, job.id).await.unwrap());

    let job = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.finished_at.is_some());
    assert!(job.started_at.is_none());
    assert_eq!(job.result.unwrap().0["from"], "queued");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn cancel_is_refused_outside_queued(pool: SqlitePool) {
    let running = running_job(&pool, "running").await;

    let done = running_job(&pool, "done").await;
    JobRepo::complete(&pool, done, &json!({ "saved": [] }))
        .await
        .unwrap();

    let failed = running_job(&pool, "failed").await;
    JobRepo::fail(&pool, failed, "x").await.unwrap();

    let cancelled = JobRepo::enqueue(&pool, &payload("cancelled")).await.unwrap().id;
    JobRepo::cancel(&pool, cancelled).await.unwrap();

    for (id, expected) in [
        (running, JobStatus::Running),
        (done, JobStatus::Done),
        (failed, JobStatus::Failed),
        (cancelled, JobStatus::Cancelled),
    ] {
        assert!(
            !JobRepo::cancel(&pool, id).await.unwrap(),
            "cancel must fail for {expected}"
        );
        assert_eq!(status(&pool, id).await, expected);
    }

    assert!(!JobRepo::cancel(&pool, 424242).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn abort_only_targets_running_jobs(pool: SqlitePool) {
    let running = running_job(&pool, "r").await;
    let queued = JobRepo::enqueue(&pool, &payload("q")).await.unwrap();

    assert!(!JobRepo::abort(&pool, queued.id).await.unwrap());
    assert_eq!(status(&pool, queued.id).await, JobStatus::Queued);

    assert!(JobRepo::abort(&pool, running).await.unwrap());

    let job = JobRepo::find_by_id(&pool, running).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.result.unwrap().0["from"], "running");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn complete_after_abort_does_not_resurrect(pool: SqlitePool) {
    let id = running_job(&pool, "a").await;
    JobRepo::abort(&pool, id).await.unwrap();

    assert!(!JobRepo::complete(&pool, id, &json!({ "saved": ["x.png"] }))
        .await
        .unwrap());
    assert_eq!(status(&pool, id).await, JobStatus::Cancelled);
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn progress_is_overwritten_in_place(pool: SqlitePool) {
    let id = running_job(&pool, "a").await;

    JobRepo::update_progress(&pool, id, &ProgressSnapshot::new(ProgressPhase::LoadingModel))
        .await
        .unwrap();
    JobRepo::update_progress(&pool, id, &ProgressSnapshot::steps(2, 4))
        .await
        .unwrap();

    let job = JobRepo::find_by_id(&pool, id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Running);
    let snapshot = job.progress_snapshot().unwrap();
    assert_eq!(snapshot.phase, ProgressPhase::Generating);
    assert_eq!(snapshot.step(), Some(2));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn progress_on_finished_job_is_accepted(pool: SqlitePool) {
    let id = running_job(&pool, "a").await;
    JobRepo::complete(&pool, id, &json!({ "saved": [] }))
        .await
        .unwrap();

    JobRepo::update_progress(&pool, id, &ProgressSnapshot::steps(4, 4))
        .await
        .unwrap();
    assert_eq!(status(&pool, id).await, JobStatus::Done);

    // Unknown ids are silently ignored.
    JobRepo::update_progress(&pool, 31337, &ProgressSnapshot::steps(1, 4))
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn find_unknown_job_returns_none(pool: SqlitePool) {
    assert!(JobRepo::find_by_id(&pool, 12345).await.unwrap().is_none());
    assert!(JobRepo::status_of(&pool, 12345).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn list_is_newest_first_with_filter_and_paging(pool: SqlitePool) {
    let a = JobRepo::enqueue(&pool, &payload("a")).await.unwrap();
    let b = JobRepo::enqueue(&pool, &payload("b")).await.unwrap();
    let c = JobRepo::enqueue(&pool, &payload("c")).await.unwrap();
    JobRepo::cancel(&pool, b.id).await.unwrap();

    let all = JobRepo::list(&pool, &JobListQuery::default()).await.unwrap();
    let ids: Vec<i64> = all.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![c.id, b.id, a.id]);

    let queued = JobRepo::list(
        &pool,
        &JobListQuery {
            status: Some(JobStatus::Queued),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let ids: Vec<i64> = queued.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![c.id, a.id]);

    let page = JobRepo::list(
        &pool,
        &JobListQuery {
            status: None,
            limit: Some(1),
            offset: Some(1),
        },
    )
    .await
    .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, b.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn status_counts_group_by_status(pool: SqlitePool) {
    let running = running_job(&pool, "r").await;
    let _ = running;
    JobRepo::enqueue(&pool, &payload("q1")).await.unwrap();
    let q2 = JobRepo::enqueue(&pool, &payload("q2")).await.unwrap();
    JobRepo::cancel(&pool, q2.id).await.unwrap();

    let counts = JobRepo::status_counts(&pool).await.unwrap();
    assert_eq!(counts.running, 1);
    assert_eq!(counts.queued, 1);
    assert_eq!(counts.cancelled, 1);
    assert_eq!(counts.done, 0);
    assert_eq!(counts.total(), 3);
}

// ---------------------------------------------------------------------------
// Queue state
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn paused_flag_defaults_off_and_round_trips(pool: SqlitePool) {
    assert!(!QueueStateRepo::is_paused(&pool).await.unwrap());

    QueueStateRepo::set_paused(&pool, true).await.unwrap();
    assert!(QueueStateRepo::is_paused(&pool).await.unwrap());

    QueueStateRepo::set_paused(&pool, false).await.unwrap();
    assert!(!QueueStateRepo::is_paused(&pool).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn paused_flag_survives_missing_row(pool: SqlitePool) {
    sqlx::query("DELETE FROM queue_state")
        .execute(&pool)
        .await
        .unwrap();
    assert!(!QueueStateRepo::is_paused(&pool).await.unwrap());

    QueueStateRepo::set_paused(&pool, true).await.unwrap();
    assert_matches!(QueueStateRepo::is_paused(&pool).await, Ok(true));
}
