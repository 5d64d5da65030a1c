//! The inference collaborator contract.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use genq_core::generation::GenerationRequest;

use crate::error::PipelineError;
use crate::progress::ProgressReporter;

/// Encoded image container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Webp => "webp",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "webp" => Ok(ImageFormat::Webp),
            other => Err(PipelineError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// One encoded image produced by a generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    /// Seed the image was generated with, when the generator reports it.
    pub seed: Option<i64>,
}

impl GeneratedImage {
    pub fn new(bytes: Vec<u8>, format: ImageFormat) -> Self {
        Self {
            bytes,
            format,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// A non-reentrant image generator.
///
/// Implementations may keep mutable model state (loaded weights, an active
/// LoRA) between calls, which is why the worker only reaches one through a
/// [`PipelineLock`](crate::PipelineLock).
#[async_trait]
pub trait ImageGenerator: Send {
    /// Load or swap whatever the request needs before generating.
    async fn prepare(&mut self, _request: &GenerationRequest) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Run one generation to completion.
    ///
    /// `Ok(None)` or an empty vector means nothing was produced; the caller
    /// then reads [`last_error`](Self::last_error) for an explanation.
    async fn generate(
        &mut self,
        request: &GenerationRequest,
        progress: &ProgressReporter,
    ) -> Result<Option<Vec<GeneratedImage>>, PipelineError>;

    /// Error recorded by the most recent call that produced nothing.
    fn last_error(&self) -> Option<String>;
}
