//! Queue worker: orphan recovery plus the loop that drains the queue
//! through the shared inference pipeline.

pub mod config;
pub mod error;
pub mod recovery;
pub mod worker;

pub use error::WorkerError;
pub use recovery::{recover_orphaned_jobs, RecoveryReport};
pub use worker::{IterationOutcome, QueueWorker};
