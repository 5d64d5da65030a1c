//! Control surface of the generation queue.
//!
//! [`control::QueueControl`] holds the transport-independent operations;
//! the rest of the crate binds them to HTTP. Exposed as a library so
//! integration tests and the binary share one router.

pub mod config;
pub mod control;
pub mod error;
pub mod handlers;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
