use std::path::PathBuf;
use std::time::Duration;

use genq_core::config::{parse_or, QueueConfig};
use genq_core::error::CoreError;
use genq_pipeline::ImageFormat;

/// Worker process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Polling, retry ceiling and backoff.
    pub queue: QueueConfig,
    /// Base URL of the generation server.
    pub inference_url: String,
    /// Directory generated images are written to.
    pub results_dir: PathBuf,
    /// Container format the generation server returns.
    pub image_format: ImageFormat,
    /// Longest a single generate request may take before the job fails.
    pub inference_timeout: Duration,
}

/// Default ceiling on one inference request.
pub const DEFAULT_INFERENCE_TIMEOUT_SECS: f64 = 600.0;

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                 |
    /// |-----------------------------|-------------------------|
    /// | `DATABASE_URL`              | `sqlite://genq.db`      |
    /// | `INFERENCE_URL`             | `http://127.0.0.1:8000` |
    /// | `RESULTS_DIR`               | `results`               |
    /// | `IMAGE_FORMAT`              | `png`                   |
    /// | `INFERENCE_TIMEOUT_SECONDS` | `600`                   |
    ///
    /// Queue tunables come from [`QueueConfig::from_env`].
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let queue = QueueConfig::from_lookup(&lookup)?;
        let image_format: ImageFormat = parse_or(&lookup, "IMAGE_FORMAT", ImageFormat::Png)?;
        let inference_timeout_secs: f64 = parse_or(
            &lookup,
            "INFERENCE_TIMEOUT_SECONDS",
            DEFAULT_INFERENCE_TIMEOUT_SECS,
        )?;
        if !(inference_timeout_secs.is_finite() && inference_timeout_secs > 0.0) {
            return Err(CoreError::Validation(format!(
                "INFERENCE_TIMEOUT_SECONDS must be positive, got {inference_timeout_secs}"
            )));
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "sqlite://genq.db".into()),
            queue,
            inference_url: lookup("INFERENCE_URL")
                .unwrap_or_else(|| "http://127.0.0.1:8000".into()),
            results_dir: lookup("RESULTS_DIR")
                .map_or_else(|| PathBuf::from("results"), PathBuf::from),
            image_format,
            inference_timeout: Duration::from_secs_f64(inference_timeout_secs),
        })
    }
}
