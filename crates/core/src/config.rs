//! Queue configuration shared by the worker and anything embedding it.

use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;

/// Default delay between polls when the queue is idle or paused.
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 1.0;
/// Default number of orphan recoveries before a job is failed.
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 3;
/// Default delay after an iteration hit an unexpected error.
pub const DEFAULT_ERROR_BACKOFF_SECS: f64 = 5.0;

/// Tunables for the worker loop and orphan recovery.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    /// Sleep between polls when there is nothing to claim.
    pub poll_interval: Duration,
    /// Orphaned jobs are requeued while their retry count stays within this
    /// ceiling and failed once it is exceeded.
    pub max_retry_count: u32,
    /// Sleep after an iteration failed unexpectedly, to avoid a tight
    /// crash loop.
    pub error_backoff: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_SECS),
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            error_backoff: Duration::from_secs_f64(DEFAULT_ERROR_BACKOFF_SECS),
        }
    }
}

impl QueueConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default |
    /// |-------------------------|---------|
    /// | `POLL_INTERVAL_SECONDS` | `1.0`   |
    /// | `MAX_RETRY_COUNT`       | `3`     |
    /// | `ERROR_BACKOFF_SECONDS` | `5.0`   |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let poll_interval_secs: f64 = parse_or(
            &lookup,
            "POLL_INTERVAL_SECONDS",
            DEFAULT_POLL_INTERVAL_SECS,
        )?;
        let max_retry_count: u32 = parse_or(&lookup, "MAX_RETRY_COUNT", DEFAULT_MAX_RETRY_COUNT)?;
        let error_backoff_secs: f64 = parse_or(
            &lookup,
            "ERROR_BACKOFF_SECONDS",
            DEFAULT_ERROR_BACKOFF_SECS,
        )?;

        Ok(Self {
            poll_interval: positive_duration("POLL_INTERVAL_SECONDS", poll_interval_secs)?,
            max_retry_count,
            error_backoff: positive_duration("ERROR_BACKOFF_SECONDS", error_backoff_secs)?,
        })
    }

    pub fn poll_interval_seconds(&self) -> f64 {
        self.poll_interval.as_secs_f64()
    }
}

/// Parse `key` through `lookup`, falling back to `default` when it is unset.
/// A value that does not parse is a [`CoreError::Validation`].
pub fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, CoreError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("{key} has an invalid value '{raw}'"))),
    }
}

fn positive_duration(key: &str, secs: f64) -> Result<Duration, CoreError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(CoreError::Validation(format!(
            "{key} must be a positive number of seconds"
        )));
    }
    Ok(Duration::from_secs_f64(secs))
}
