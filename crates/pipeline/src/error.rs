//! Errors raised by pipeline collaborators.
//!
//! Every variant is a per-job failure: the worker records the message on
//! the job row and moves on.

use crate::http::HttpGeneratorError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The generator rejected or could not run the request.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Talking to the remote inference server failed.
    #[error(transparent)]
    Inference(#[from] HttpGeneratorError),

    /// Writing artifacts failed.
    #[error("Failed to save images: {0}")]
    Save(String),

    #[error("Unsupported image format '{0}'")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The generator panicked. Carries the panic message when it was a string.
    #[error("Generator panicked: {0}")]
    Panicked(String),
}
