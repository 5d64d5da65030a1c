//! Inference pipeline collaborators for the queue worker.
//!
//! The worker never talks to a model directly. It drives an
//! [`ImageGenerator`] held behind a [`PipelineLock`] and hands the output to
//! an [`ImageSaver`]. This crate defines those contracts and ships one
//! concrete adapter for each: [`HttpGenerator`] forwards requests to a
//! remote generation server, [`DiskImageSaver`] writes images to a results
//! directory.

pub mod error;
pub mod generator;
pub mod http;
pub mod lock;
pub mod progress;
pub mod saver;

pub use error::PipelineError;
pub use generator::{GeneratedImage, ImageFormat, ImageGenerator};
pub use http::{HttpGenerator, HttpGeneratorError};
pub use lock::PipelineLock;
pub use progress::ProgressReporter;
pub use saver::{DiskImageSaver, ImageSaver, ResultEntry};
