//! Stub collaborators and helpers shared by the worker integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use genq_core::config::QueueConfig;
use genq_core::generation::GenerationRequest;
use genq_core::types::DbId;
use genq_db::models::job::Job;
use genq_db::repositories::JobRepo;
use genq_pipeline::{
    GeneratedImage, ImageFormat, ImageGenerator, ImageSaver, PipelineError, PipelineLock,
    ProgressReporter,
};
use genq_worker::QueueWorker;
use sqlx::SqlitePool;
use tokio::sync::oneshot;

/// Config with intervals short enough for tests.
pub fn test_config() -> QueueConfig {
    QueueConfig {
        poll_interval: Duration::from_millis(10),
        max_retry_count: 3,
        error_backoff: Duration::from_millis(10),
    }
}

pub fn payload() -> serde_json::Value {
    serde_json::json!({"prompt": "x", "steps": 1})
}

pub async fn enqueue(pool: &SqlitePool) -> DbId {
    JobRepo::enqueue(pool, &payload()).await.unwrap().id
}

pub async fn job(pool: &SqlitePool, id: DbId) -> Job {
    JobRepo::find_by_id(pool, id).await.unwrap().unwrap()
}

pub fn worker<G: ImageGenerator>(
    pool: &SqlitePool,
    generator: G,
    saver: RecordingSaver,
) -> QueueWorker<G, RecordingSaver> {
    QueueWorker::new(
        pool.clone(),
        PipelineLock::new(generator),
        saver,
        test_config(),
    )
}

/// Poll `check` until it holds or two seconds pass.
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// What the next `generate` call of a [`ScriptedGenerator`] does.
#[derive(Debug, Clone)]
pub enum Step {
    Images(usize),
    Raise(String),
    Empty(Option<String>),
    Panic(String),
}

/// Plays back a script of behaviours, then keeps producing one image.
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    script: Arc<Mutex<VecDeque<Step>>>,
    calls: Arc<AtomicUsize>,
    last_error: Option<String>,
}

impl ScriptedGenerator {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps.into_iter().collect())),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl ImageGenerator for ScriptedGenerator {
    async fn generate(
        &mut self,
        _request: &GenerationRequest,
        _progress: &ProgressReporter,
    ) -> Result<Option<Vec<GeneratedImage>>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_error = None;

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Images(1));

        match step {
            Step::Images(count) => Ok(Some(images(count))),
            Step::Raise(message) => Err(PipelineError::Generation(message)),
            Step::Empty(error) => {
                self.last_error = error;
                Ok(None)
            }
            Step::Panic(message) => panic!("{message}"),
        }
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}

/// Signals when generation starts, then blocks until released.
pub struct GatedGenerator {
    started: Option<oneshot::Sender<()>>,
    release: Option<oneshot::Receiver<()>>,
    /// Step reported before blocking, as `(current, total)`.
    report: Option<(u32, u32)>,
}

pub struct Gate {
    pub started: oneshot::Receiver<()>,
    pub release: oneshot::Sender<()>,
}

impl GatedGenerator {
    pub fn new() -> (Self, Gate) {
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let generator = Self {
            started: Some(started_tx),
            release: Some(release_rx),
            report: None,
        };
        let gate = Gate {
            started: started_rx,
            release: release_tx,
        };
        (generator, gate)
    }

    pub fn reporting(mut self, current: u32, total: u32) -> Self {
        self.report = Some((current, total));
        self
    }
}

#[async_trait]
impl ImageGenerator for GatedGenerator {
    async fn generate(
        &mut self,
        _request: &GenerationRequest,
        progress: &ProgressReporter,
    ) -> Result<Option<Vec<GeneratedImage>>, PipelineError> {
        if let Some((current, total)) = self.report {
            progress.step(current, total);
        }
        if let Some(started) = self.started.take() {
            let _ = started.send(());
        }
        if let Some(release) = self.release.take() {
            let _ = release.await;
        }
        Ok(Some(images(1)))
    }

    fn last_error(&self) -> Option<String> {
        None
    }
}

pub fn images(count: usize) -> Vec<GeneratedImage> {
    (0..count)
        .map(|i| GeneratedImage::new(vec![i as u8; 4], ImageFormat::Png))
        .collect()
}

// ---------------------------------------------------------------------------
// Saver
// ---------------------------------------------------------------------------

/// Records calls and returns synthetic artifact ids. Optionally gated like
/// [`GatedGenerator`].
#[derive(Default)]
pub struct RecordingSaver {
    calls: Arc<AtomicUsize>,
    gate: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
}

impl RecordingSaver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> (Self, Gate) {
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        let saver = Self {
            calls: Arc::default(),
            gate: Mutex::new(Some((started_tx, release_rx))),
        };
        let gate = Gate {
            started: started_rx,
            release: release_tx,
        };
        (saver, gate)
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl ImageSaver for RecordingSaver {
    async fn save(
        &self,
        images: &[GeneratedImage],
        _request: &GenerationRequest,
    ) -> Result<Vec<String>, PipelineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        let gate = self.gate.lock().unwrap().take();
        if let Some((started, release)) = gate {
            let _ = started.send(());
            let _ = release.await;
        }

        Ok((1..=images.len())
            .map(|n| format!("gen{call}-{n}.png"))
            .collect())
    }
}
