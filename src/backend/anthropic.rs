//! Backend for the Anthropic Messages API.
//!
//! [`AnthropicBackend`] sends the image as a base64 content block followed by
//! the instruction text, on `POST /v1/messages`. Follow-up turns (corrective
//! re-prompts) are appended as plain text messages.

use super::{ContentBlock, Role, VisionBackend, VisionRequest, VisionResponse};
use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Backend for Anthropic's vision-capable models.
///
/// # Example
///
/// ```
/// use clayquest::backend::AnthropicBackend;
///
/// let backend = AnthropicBackend::new(Some("sk-ant-...".to_string()));
/// ```
#[derive(Clone)]
pub struct AnthropicBackend {
    api_key: Option<String>,
    base_url: String,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicBackend {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the backend at a different host (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the request body for `/v1/messages`.
    fn build_body(request: &VisionRequest) -> Value {
        let mut messages = vec![json!({
            "role": "user",
            "content": [
                {
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": request.media_type,
                        "data": request.image_base64,
                    }
                },
                { "type": "text", "text": request.prompt }
            ]
        })];

        for msg in &request.follow_ups {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(json!({"role": role, "content": msg.content}));
        }

        json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        })
    }

    /// Parse the response `content` array into blocks.
    fn parse_content(json_resp: &Value) -> Vec<ContentBlock> {
        json_resp
            .get("content")
            .and_then(|c| c.as_array())
            .map(|blocks| {
                blocks
                    .iter()
                    .map(|b| {
                        let kind = b.get("type").and_then(|t| t.as_str()).unwrap_or("");
                        match (kind, b.get("text").and_then(|t| t.as_str())) {
                            ("text", Some(text)) => ContentBlock::Text(text.to_string()),
                            _ => ContentBlock::Other(kind.to_string()),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Map a non-success response to a classified error.
    ///
    /// 404 and `not_found_error` mean the model id is not served; everything
    /// else keeps its status so the caller can decide on retry.
    fn classify_error(
        status: u16,
        body: &str,
        model: &str,
        retry_after: Option<Duration>,
    ) -> PipelineError {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let error_type = parsed
            .as_ref()
            .and_then(|v| v.pointer("/error/type"))
            .and_then(|t| t.as_str());
        let message = parsed
            .as_ref()
            .and_then(|v| v.pointer("/error/message"))
            .and_then(|m| m.as_str())
            .unwrap_or(body);

        if status == 404 || error_type == Some("not_found_error") {
            return PipelineError::ModelUnavailable {
                model: model.to_string(),
                message: message.to_string(),
            };
        }

        PipelineError::HttpError {
            status,
            body: message.to_string(),
            retry_after,
        }
    }

    /// Parse a `Retry-After` header value as seconds.
    fn parse_retry_after(value: &str) -> Option<Duration> {
        value.trim().parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[async_trait]
impl VisionBackend for AnthropicBackend {
    async fn complete(&self, client: &Client, request: &VisionRequest) -> Result<VisionResponse> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::InvalidConfig("ANTHROPIC_API_KEY is not set".into()))?;

        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_body(request);

        let resp = client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();

        if !resp.status().is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(Self::parse_retry_after);
            let text = resp.text().await.unwrap_or_default();
            return Err(Self::classify_error(status, &text, &request.model, retry_after));
        }

        let json_resp: Value = resp.json().await?;
        let model = json_resp
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(request.model.as_str())
            .to_string();

        Ok(VisionResponse {
            content: Self::parse_content(&json_resp),
            status,
            model,
        })
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}
