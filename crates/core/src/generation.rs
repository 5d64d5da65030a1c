//! Generation request schema: the payload a client enqueues and the worker
//! hands to the inference pipeline.
//!
//! The queue stores payloads as opaque JSON. [`GenerationRequest::parse`] is
//! the single place where that JSON is deserialized and validated, used both
//! at enqueue time (client error) and by the worker before generation
//! (per-job failure).

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Model used when the request does not name one.
pub const DEFAULT_MODEL_ID: &str = "Lykon/dreamshaper-8";
/// Default output width and height in pixels.
pub const DEFAULT_IMAGE_SIZE: u32 = 512;
/// Default number of denoising steps.
pub const DEFAULT_INFERENCE_STEPS: u32 = 4;
/// Default classifier-free guidance scale.
pub const DEFAULT_GUIDANCE_SCALE: f64 = 1.0;
/// Default strength for image-to-image generation.
pub const DEFAULT_STRENGTH: f64 = 0.5;

fn default_model_id() -> String {
    DEFAULT_MODEL_ID.to_string()
}

fn default_image_size() -> u32 {
    DEFAULT_IMAGE_SIZE
}

fn default_inference_steps() -> u32 {
    DEFAULT_INFERENCE_STEPS
}

fn default_guidance_scale() -> f64 {
    DEFAULT_GUIDANCE_SCALE
}

fn default_strength() -> f64 {
    DEFAULT_STRENGTH
}

fn default_number_of_images() -> u32 {
    1
}

fn default_lora_weight() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Kind of diffusion task requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffusionTask {
    #[default]
    TextToImage,
    ImageToImage,
}

/// LoRA weights to apply before generation.
///
/// Swapping a LoRA mutates shared pipeline state, so it only ever happens
/// while the worker holds the pipeline lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct LoraSetting {
    #[validate(length(min = 1, max = 512))]
    pub path: String,
    #[serde(default = "default_lora_weight")]
    #[validate(range(min = -4.0, max = 4.0))]
    pub weight: f64,
}

/// A single image-generation request.
///
/// Immutable once enqueued; a retried job re-runs the same request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GenerationRequest {
    #[serde(default = "default_model_id", alias = "lcm_model_id")]
    #[validate(length(min = 1, max = 256))]
    pub model_id: String,

    #[validate(length(min = 1, max = 4000))]
    pub prompt: String,

    #[serde(default)]
    #[validate(length(max = 4000))]
    pub negative_prompt: String,

    #[serde(default)]
    pub diffusion_task: DiffusionTask,

    #[serde(default = "default_image_size")]
    #[validate(range(min = 64, max = 2048))]
    pub image_width: u32,

    #[serde(default = "default_image_size")]
    #[validate(range(min = 64, max = 2048))]
    pub image_height: u32,

    #[serde(default = "default_inference_steps", alias = "steps")]
    #[validate(range(min = 1, max = 150))]
    pub inference_steps: u32,

    #[serde(default = "default_guidance_scale")]
    #[validate(range(min = 0.0, max = 30.0))]
    pub guidance_scale: f64,

    #[serde(default = "default_number_of_images")]
    #[validate(range(min = 1, max = 8))]
    pub number_of_images: u32,

    /// Fixed seed; `None` lets the pipeline pick one.
    #[serde(default)]
    pub seed: Option<i64>,

    /// Base64-encoded source image, required for image-to-image.
    #[serde(default)]
    pub init_image: Option<String>,

    #[serde(default = "default_strength")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub strength: f64,

    #[serde(default)]
    #[validate(nested)]
    pub lora: Option<LoraSetting>,
}

impl GenerationRequest {
    /// Deserialize and validate a stored or submitted payload.
    ///
    /// Accepts `steps` as an alias for `inference_steps` and `lcm_model_id`
    /// for `model_id`. Unknown fields are ignored. Every failure is a
    /// [`CoreError::Validation`].
    pub fn parse(payload: &serde_json::Value) -> Result<Self, CoreError> {
        let request = Self::deserialize(payload)
            .map_err(|e| CoreError::Validation(format!("Invalid generation request: {e}")))?;

        request
            .validate()
            .map_err(|e| CoreError::Validation(format!("Invalid generation request: {e}")))?;

        request.validate_task_inputs()?;

        Ok(request)
    }

    /// Serialize back to the JSON form stored in the queue.
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Total denoising steps across all requested images.
    pub fn total_steps(&self) -> u32 {
        self.inference_steps.saturating_mul(self.number_of_images)
    }

    fn validate_task_inputs(&self) -> Result<(), CoreError> {
        let has_init_image = self
            .init_image
            .as_deref()
            .is_some_and(|image| !image.trim().is_empty());

        if self.diffusion_task == DiffusionTask::ImageToImage && !has_init_image {
            return Err(CoreError::Validation(
                "init_image is required for image_to_image".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
