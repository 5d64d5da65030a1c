pub mod queue;
pub mod queue_state;
pub mod results;
