pub mod job_repo;
pub mod queue_state_repo;

pub use job_repo::JobRepo;
pub use queue_state_repo::QueueStateRepo;
