//! Repository for the single-row `queue_state` table.

use chrono::Utc;

use crate::DbPool;

/// Row id of the only `queue_state` row.
const STATE_ROW_ID: i64 = 1;

/// Accessors for queue-wide control state.
pub struct QueueStateRepo;

impl QueueStateRepo {
    /// Whether the worker should stop claiming new jobs. A missing row
    /// reads as not paused.
    pub async fn is_paused(pool: &DbPool) -> Result<bool, sqlx::Error> {
        let paused = sqlx::query_scalar::<_, bool>("SELECT paused FROM queue_state WHERE id = ?1")
            .bind(STATE_ROW_ID)
            .fetch_optional(pool)
            .await?;
        Ok(paused.unwrap_or(false))
    }

    /// Set the paused flag. Jobs already running are not affected.
    pub async fn set_paused(pool: &DbPool, paused: bool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO queue_state (id, paused, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT (id) DO UPDATE SET paused = excluded.paused, \
                 updated_at = excluded.updated_at",
        )
        .bind(STATE_ROW_ID)
        .bind(paused)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        tracing::debug!(paused, "Queue paused flag updated");
        Ok(())
    }
}
