//! Process-wide mutual exclusion around the inference pipeline.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

/// Owns the generator so it can only be reached while the lock is held.
///
/// Cloning shares the same lock. The guard releases on drop, which covers
/// early returns, `?` and unwinding alike.
pub struct PipelineLock<G> {
    inner: Arc<Mutex<G>>,
}

impl<G> PipelineLock<G> {
    pub fn new(generator: G) -> Self {
        Self {
            inner: Arc::new(Mutex::new(generator)),
        }
    }

    /// Wait for exclusive access to the generator.
    pub async fn acquire(&self) -> MutexGuard<'_, G> {
        self.inner.lock().await
    }

    /// Take the lock only if nobody holds it.
    pub fn try_acquire(&self) -> Option<MutexGuard<'_, G>> {
        self.inner.try_lock().ok()
    }
}

impl<G> Clone for PipelineLock<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
