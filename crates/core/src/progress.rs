//! Progress snapshots written while a job is running.
//!
//! A snapshot is overwritten in place on the job row; it is not a log. The
//! stored form is plain JSON so older readers keep working when new phases
//! or fields appear.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Field key for the current denoising step.
pub const FIELD_STEP: &str = "step";
/// Field key for the total number of denoising steps.
pub const FIELD_TOTAL_STEPS: &str = "total_steps";
/// Field key for the completion percentage (0-100).
pub const FIELD_PERCENT: &str = "percent";

/// Phase of the worker's per-job sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Validating,
    LoadingModel,
    Generating,
    Saving,
    /// A phase written by a newer version.
    #[serde(other)]
    Unknown,
}

/// Point-in-time view of a running job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub phase: ProgressPhase,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    #[serde(default = "Utc::now")]
    pub updated_at: Timestamp,
}

impl ProgressSnapshot {
    pub fn new(phase: ProgressPhase) -> Self {
        Self {
            phase,
            fields: serde_json::Map::new(),
            updated_at: Utc::now(),
        }
    }

    /// Attach a free-form field.
    pub fn with_field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// A `generating` snapshot for step `current` of `total`.
    pub fn steps(current: u32, total: u32) -> Self {
        let percent = if total == 0 {
            0
        } else {
            (u64::from(current.min(total)) * 100 / u64::from(total)) as u32
        };

        Self::new(ProgressPhase::Generating)
            .with_field(FIELD_STEP, current)
            .with_field(FIELD_TOTAL_STEPS, total)
            .with_field(FIELD_PERCENT, percent)
    }

    /// Current step, if this snapshot carries one.
    pub fn step(&self) -> Option<u64> {
        self.fields.get(FIELD_STEP).and_then(serde_json::Value::as_u64)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Read a stored snapshot. Returns `None` for anything that is not a
    /// snapshot object.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }
}
