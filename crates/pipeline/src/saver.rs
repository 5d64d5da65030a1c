//! The artifact saver contract and its on-disk implementation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use genq_core::generation::GenerationRequest;
use genq_core::types::Timestamp;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::generator::GeneratedImage;

/// Persists generated images and returns their artifact ids.
#[async_trait]
pub trait ImageSaver: Send + Sync {
    async fn save(
        &self,
        images: &[GeneratedImage],
        request: &GenerationRequest,
    ) -> Result<Vec<String>, PipelineError>;
}

/// A finished file in the results directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultEntry {
    pub name: String,
    pub size: u64,
    pub modified: Option<Timestamp>,
}

/// Payload keys left out of the sidecar: bulky or machine-local.
const SIDECAR_EXCLUDED_KEYS: &[&str] = &["init_image", "lora"];

/// Writes images into a single results directory.
///
/// One call produces `<uuid>-1.<ext>`, `<uuid>-2.<ext>`, ... and a
/// `<uuid>.json` sidecar with the generation settings. Each file is written
/// to a hidden temp name, fsynced, then renamed into place, so readers never
/// observe a partial image. Artifact ids are the image file names.
#[derive(Debug, Clone)]
pub struct DiskImageSaver {
    root: PathBuf,
}

impl DiskImageSaver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files in the results directory, names in descending order.
    ///
    /// Images and sidecars are both listed; in-flight temp files are not. A
    /// directory that does not exist yet lists as empty.
    pub async fn list_results(&self) -> Result<Vec<ResultEntry>, PipelineError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            entries.push(ResultEntry {
                name,
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        entries.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(entries)
    }

    fn sidecar(images: &[GeneratedImage], request: &GenerationRequest) -> serde_json::Value {
        let mut settings = request.to_payload();
        if let Some(map) = settings.as_object_mut() {
            for key in SIDECAR_EXCLUDED_KEYS {
                map.remove(*key);
            }
            let seeds: Vec<i64> = images.iter().filter_map(|image| image.seed).collect();
            if !seeds.is_empty() {
                map.insert("image_seeds".to_string(), seeds.into());
            }
        }
        settings
    }
}

#[async_trait]
impl ImageSaver for DiskImageSaver {
    async fn save(
        &self,
        images: &[GeneratedImage],
        request: &GenerationRequest,
    ) -> Result<Vec<String>, PipelineError> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        tokio::fs::create_dir_all(&self.root).await?;

        let generation_id = Uuid::new_v4();
        let mut saved = Vec::with_capacity(images.len());

        for (index, image) in images.iter().enumerate() {
            let file_name = format!(
                "{generation_id}-{}.{}",
                index + 1,
                image.format.extension()
            );
            write_atomic(&self.root, &file_name, &image.bytes).await?;
            saved.push(file_name);
        }

        let sidecar = serde_json::to_vec_pretty(&Self::sidecar(images, request))?;
        write_atomic(&self.root, &format!("{generation_id}.json"), &sidecar).await?;

        sync_dir(&self.root).await;

        tracing::debug!(
            dir = %self.root.display(),
            count = saved.len(),
            %generation_id,
            "Saved generated images",
        );
        Ok(saved)
    }
}

/// Write `bytes` to `dir/file_name` through a fsynced temp file and rename.
async fn write_atomic(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<(), PipelineError> {
    let final_path = dir.join(file_name);
    let temp_path = dir.join(format!(".{file_name}.tmp"));

    let mut file = tokio::fs::File::create(&temp_path).await?;
    if let Err(e) = write_and_sync(&mut file, bytes).await {
        drop(file);
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    drop(file);

    tokio::fs::rename(&temp_path, &final_path).await?;
    Ok(())
}

async fn write_and_sync(file: &mut tokio::fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Flush directory metadata so renamed files survive a crash. Best effort:
/// not every platform lets a directory be opened for syncing.
async fn sync_dir(dir: &Path) {
    let result = async { tokio::fs::File::open(dir).await?.sync_all().await }.await;
    if let Err(e) = result {
        tracing::debug!(dir = %dir.display(), error = %e, "Directory sync skipped");
    }
}
