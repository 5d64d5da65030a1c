//! [`ImageGenerator`] backed by a remote generation server.
//!
//! Speaks the `POST /api/generate` contract: the request carries the
//! diffusion settings, the response is
//! `{"latency": f64, "images": [base64], "error": string | null}`. An empty
//! image list is a null return, with the server's `error` kept for
//! [`ImageGenerator::last_error`].

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use genq_core::generation::{DiffusionTask, GenerationRequest};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::generator::{GeneratedImage, ImageFormat, ImageGenerator};
use crate::progress::ProgressReporter;

/// Errors from the inference HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum HttpGeneratorError {
    /// The HTTP request itself failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("Inference server error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// An image in the response was not valid base64.
    #[error("Invalid image encoding: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Wire body for `POST /api/generate`.
#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    lcm_model_id: &'a str,
    prompt: &'a str,
    negative_prompt: &'a str,
    diffusion_task: DiffusionTask,
    image_width: u32,
    image_height: u32,
    inference_steps: u32,
    guidance_scale: f64,
    number_of_images: u32,
    seed: i64,
    use_seed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    init_image: Option<&'a str>,
    strength: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    lora: Option<InferenceLora<'a>>,
}

#[derive(Debug, Serialize)]
struct InferenceLora<'a> {
    path: &'a str,
    weight: f64,
    enabled: bool,
}

impl<'a> From<&'a GenerationRequest> for InferenceRequest<'a> {
    fn from(request: &'a GenerationRequest) -> Self {
        Self {
            lcm_model_id: &request.model_id,
            prompt: &request.prompt,
            negative_prompt: &request.negative_prompt,
            diffusion_task: request.diffusion_task,
            image_width: request.image_width,
            image_height: request.image_height,
            inference_steps: request.inference_steps,
            guidance_scale: request.guidance_scale,
            number_of_images: request.number_of_images,
            seed: request.seed.unwrap_or(-1),
            use_seed: request.seed.is_some(),
            init_image: request.init_image.as_deref(),
            strength: request.strength,
            lora: request.lora.as_ref().map(|lora| InferenceLora {
                path: &lora.path,
                weight: lora.weight,
                enabled: true,
            }),
        }
    }
}

/// Response body of `POST /api/generate`.
#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    latency: f64,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for a single generation server.
pub struct HttpGenerator {
    client: reqwest::Client,
    api_url: String,
    format: ImageFormat,
    last_error: Option<String>,
}

impl HttpGenerator {
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:8000`.
    /// * `format` - Container format the server encodes images in.
    /// * `timeout` - Upper bound on one generate call. A server that hangs
    ///   past it fails the job instead of holding the pipeline forever.
    pub fn new(
        api_url: impl Into<String>,
        format: ImageFormat,
        timeout: Duration,
    ) -> Result<Self, HttpGeneratorError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url, format))
    }

    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        format: ImageFormat,
    ) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            api_url,
            format,
            last_error: None,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn post_generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<InferenceResponse, HttpGeneratorError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.api_url))
            .json(&InferenceRequest::from(request))
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.json().await?)
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, HttpGeneratorError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {e}>"));
            return Err(HttpGeneratorError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

/// Decode one base64 image, tolerating a `data:` URI prefix.
fn decode_image(encoded: &str) -> Result<Vec<u8>, HttpGeneratorError> {
    let data = match encoded.split_once(";base64,") {
        Some((_, data)) => data,
        None => encoded,
    };
    Ok(STANDARD.decode(data.trim())?)
}

#[async_trait]
impl ImageGenerator for HttpGenerator {
    async fn generate(
        &mut self,
        request: &GenerationRequest,
        progress: &ProgressReporter,
    ) -> Result<Option<Vec<GeneratedImage>>, PipelineError> {
        self.last_error = None;

        let response = self.post_generate(request).await?;
        tracing::debug!(
            latency = response.latency,
            images = response.images.len(),
            "Inference server responded",
        );

        if response.images.is_empty() {
            self.last_error = response.error.filter(|e| !e.trim().is_empty());
            return Ok(None);
        }

        let images = response
            .images
            .iter()
            .map(|encoded| {
                let image = GeneratedImage::new(decode_image(encoded)?, self.format);
                Ok(match request.seed {
                    Some(seed) => image.with_seed(seed),
                    None => image,
                })
            })
            .collect::<Result<Vec<_>, HttpGeneratorError>>()?;

        let total = request.total_steps();
        progress.step(total, total);

        Ok(Some(images))
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}
