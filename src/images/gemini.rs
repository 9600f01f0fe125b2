//! Imagen through the Gemini API.
//!
//! Synchronous: one `:predict` call returns the image as base64 in the body.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::debug;

use super::{GeneratedImage, ImageProvider, ImageReference, ProviderKind};
use crate::config::DEFAULT_GEMINI_MODEL;
use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::types::ImageGenerationOptions;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Clone)]
pub struct GeminiProvider {
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_body(options: &ImageGenerationOptions) -> Value {
        json!({
            "instances": [{ "prompt": options.prompt }],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": options.aspect_ratio.as_str(),
            }
        })
    }

    /// Pull the first prediction's bytes out of a `:predict` response.
    fn parse_prediction(json_resp: &Value) -> Result<(Vec<u8>, String)> {
        let prediction = json_resp
            .pointer("/predictions/0")
            .ok_or(PipelineError::EmptyResult("gemini"))?;
        let encoded = prediction
            .get("bytesBase64Encoded")
            .and_then(|v| v.as_str())
            .ok_or(PipelineError::EmptyResult("gemini"))?;
        let mime_type = prediction
            .get("mimeType")
            .and_then(|v| v.as_str())
            .unwrap_or("image/png")
            .to_string();
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| PipelineError::InvalidImage(format!("gemini returned bad base64: {e}")))?;
        Ok((bytes, mime_type))
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(
        &self,
        ctx: &ExecCtx,
        options: &ImageGenerationOptions,
    ) -> Result<GeneratedImage> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(PipelineError::ProviderUnavailable("gemini"))?;
        ctx.check_cancelled()?;

        let started = Instant::now();
        let url = format!("{}/v1beta/models/{}:predict", self.base_url, self.model);
        let resp = ctx
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&Self::build_body(options))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::HttpError {
                status,
                body,
                retry_after: None,
            });
        }

        let json_resp: Value = resp.json().await?;
        let (bytes, mime_type) = Self::parse_prediction(&json_resp)?;
        debug!(size = bytes.len(), "gemini image received");

        Ok(GeneratedImage {
            reference: ImageReference::Inline { bytes, mime_type },
            provider: ProviderKind::Gemini,
            duration: started.elapsed(),
        })
    }
}
