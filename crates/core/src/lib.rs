//! Domain types shared by the queue store, the worker and the API.
//!
//! Nothing in this crate performs I/O. The generation request schema,
//! progress snapshots and queue configuration live here so every layer
//! agrees on their shape.

pub mod config;
pub mod error;
pub mod generation;
pub mod progress;
pub mod types;
