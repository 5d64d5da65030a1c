//! Progress reporting from inside a generation call.
//!
//! The generator runs while the worker awaits it, so it cannot write to the
//! store itself. It pushes snapshots into a channel instead, and the worker
//! drains that channel into `jobs.progress`.

use genq_core::progress::ProgressSnapshot;
use tokio::sync::mpsc;

/// Sending half handed to [`ImageGenerator::generate`](crate::ImageGenerator::generate).
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ProgressSnapshot>>,
}

impl ProgressReporter {
    /// Create a reporter and the receiver that observes it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A reporter that drops everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Publish a snapshot. Never fails; a closed receiver drops it.
    pub fn report(&self, snapshot: ProgressSnapshot) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(snapshot);
        }
    }

    /// Publish a `generating` snapshot for denoising step `current` of `total`.
    pub fn step(&self, current: u32, total: u32) {
        self.report(ProgressSnapshot::steps(current, total));
    }
}
