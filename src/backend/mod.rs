//! Vision backend trait and normalized request/response types.
//!
//! The [`VisionBackend`] trait abstracts over vision-capable text models,
//! translating between the normalized [`VisionRequest`]/[`VisionResponse`]
//! and a provider's HTTP API. Built-in implementations:
//! [`AnthropicBackend`], [`MockBackend`].
//!
//! ## Architecture
//!
//! ```text
//! VisionDescriber ──► VisionRequest ──► with_backoff() ──► VisionBackend::complete()
//!                                                              │
//!                                                   ┌──────────┴──────────┐
//!                                           AnthropicBackend         MockBackend
//!                                             /v1/messages         canned replies
//! ```
//!
//! Backends classify failures: a missing model is
//! [`PipelineError::ModelUnavailable`], so the describer never has to
//! inspect error text to decide whether to try the next candidate.

pub mod anthropic;
pub mod backoff;
pub mod mock;

pub use anthropic::AnthropicBackend;
pub use backoff::BackoffConfig;
pub use mock::MockBackend;

use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::warn;

/// A normalized vision request -- provider-agnostic.
#[derive(Clone)]
pub struct VisionRequest {
    /// Model identifier (e.g. `"claude-sonnet-4-20250514"`).
    pub model: String,

    /// Base64 image payload, without data-URL prefix.
    pub image_base64: String,

    /// Media type of the image, e.g. `image/jpeg`.
    pub media_type: String,

    /// Instruction text sent alongside the image.
    pub prompt: String,

    /// Follow-up turns after the initial image+prompt message.
    /// Empty for initial calls; used for corrective re-prompts.
    pub follow_ups: Vec<ChatMessage>,

    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl std::fmt::Debug for VisionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionRequest")
            .field("model", &self.model)
            .field("image_base64_len", &self.image_base64.len())
            .field("media_type", &self.media_type)
            .field("prompt_len", &self.prompt.len())
            .field("follow_ups", &self.follow_ups.len())
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: Role,
    /// The message content.
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One block of model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentBlock {
    /// Generated text.
    Text(String),
    /// Any non-text block, kept by type name only.
    Other(String),
}

/// A normalized vision response.
#[derive(Debug)]
pub struct VisionResponse {
    /// Content blocks in the order the model produced them.
    pub content: Vec<ContentBlock>,

    /// HTTP status code (for diagnostics/logging).
    pub status: u16,

    /// Model that answered.
    pub model: String,
}

impl VisionResponse {
    /// The first text-typed content block, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|b| match b {
            ContentBlock::Text(t) => Some(t.as_str()),
            ContentBlock::Other(_) => None,
        })
    }
}

/// Abstraction over vision-capable text models.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn VisionBackend>`.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Execute one image+text completion.
    ///
    /// Implementations must report a missing or unserved model as
    /// [`PipelineError::ModelUnavailable`].
    async fn complete(&self, client: &Client, request: &VisionRequest) -> Result<VisionResponse>;

    /// Whether the backend has the credentials it needs.
    fn is_configured(&self) -> bool {
        true
    }

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Check whether a [`PipelineError`] is a transient transport failure.
///
/// Retryable conditions:
/// - [`PipelineError::HttpError`] with a status in `config.retryable_statuses`
/// - [`PipelineError::Request`] (connection/transport errors)
pub fn is_retryable(error: &PipelineError, config: &BackoffConfig) -> bool {
    match error {
        PipelineError::HttpError { status, .. } => config.retryable_statuses.contains(status),
        PipelineError::Request(_) => true,
        _ => false,
    }
}

/// Execute a backend call with transport-level retry and exponential backoff.
///
/// Uses `ctx.backoff`. Returns the first successful response, or the last
/// error once retries are exhausted. Non-transient errors (including
/// [`PipelineError::ModelUnavailable`]) return immediately.
pub async fn with_backoff(
    backend: &Arc<dyn VisionBackend>,
    ctx: &ExecCtx,
    request: &VisionRequest,
) -> Result<VisionResponse> {
    let config = &ctx.backoff;
    let mut attempt = 0;

    loop {
        ctx.check_cancelled()?;

        match backend.complete(&ctx.client, request).await {
            Ok(response) => return Ok(response),
            Err(e) if attempt < config.max_retries && is_retryable(&e, config) => {
                let delay = match &e {
                    PipelineError::HttpError {
                        retry_after: Some(ra),
                        ..
                    } if config.respect_retry_after => *ra,
                    _ => config.delay_for_attempt(attempt),
                };
                attempt += 1;
                warn!(
                    backend = backend.name(),
                    model = %request.model,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient model error, retrying"
                );
                ctx.sleep(delay).await?;
            }
            Err(e) => return Err(e),
        }
    }
}
