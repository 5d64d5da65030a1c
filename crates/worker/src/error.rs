/// Process-scoped failures of a worker iteration.
///
/// Anything that concerns a single job is recorded on that job instead;
/// these errors mean the queue itself could not be worked.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
