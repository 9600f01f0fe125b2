//! Service configuration.
//!
//! [`Config`] is built once at startup (the binary fills it from flags and
//! environment) and handed to each component's constructor. Nothing below
//! this module reads the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::backend::BackoffConfig;
use crate::exec_ctx::ExecCtx;
use crate::images::ProviderKind;
use crate::types::AspectRatio;

/// Vision model ids, tried in order until one is served.
pub const DEFAULT_VISION_MODELS: &[&str] = &[
    "claude-sonnet-4-20250514",
    "claude-3-5-sonnet-20241022",
    "claude-3-5-haiku-20241022",
    "claude-3-opus-20240229",
    "claude-3-haiku-20240307",
];

pub const DEFAULT_VOICE_ID: &str = "JBFqnCBsd6RMkjVDRZzb";

pub const DEFAULT_GEMINI_MODEL: &str = "imagen-4.0-generate-001";

/// Everything the pipeline and server need, resolved up front.
#[derive(Clone)]
pub struct Config {
    /// Preferred image provider.
    pub image_provider: ProviderKind,

    /// Provider tried once when the primary fails.
    pub image_provider_fallback: Option<ProviderKind>,

    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub freepik_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: String,

    /// Ordered vision model candidates.
    pub vision_models: Vec<String>,
    pub vision_max_tokens: u32,

    /// Imagen model used by the Gemini provider.
    pub gemini_model: String,

    /// Shape of every page illustration.
    pub aspect_ratio: AspectRatio,

    /// When set, the captured photo is sent as a structure reference with
    /// this strength (0-100).
    pub reference_strength: Option<u8>,

    /// Root of the on-disk caches; images and audio live in subdirectories.
    pub temp_dir: PathBuf,
    pub images_url_prefix: String,
    pub audio_url_prefix: String,

    /// Per-call HTTP timeout for every outbound request.
    pub request_timeout: Duration,

    /// Wall-clock budget for one inbound request, polling included.
    pub request_deadline: Duration,

    /// Polling cadence for task-style image providers.
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,

    /// Corrective re-prompts allowed when an outline fails validation.
    pub outline_retries: u32,

    /// Transport retry for model calls.
    pub backoff: BackoffConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_provider: ProviderKind::Freepik,
            image_provider_fallback: None,
            anthropic_api_key: None,
            gemini_api_key: None,
            freepik_api_key: None,
            elevenlabs_api_key: None,
            elevenlabs_voice_id: DEFAULT_VOICE_ID.to_string(),
            vision_models: DEFAULT_VISION_MODELS.iter().map(|m| m.to_string()).collect(),
            vision_max_tokens: 2000,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            aspect_ratio: AspectRatio::default(),
            reference_strength: None,
            temp_dir: PathBuf::from("temp"),
            images_url_prefix: "/temp/images".to_string(),
            audio_url_prefix: "/temp/audio".to_string(),
            request_timeout: Duration::from_secs(30),
            request_deadline: Duration::from_secs(300),
            poll_interval: Duration::from_secs(2),
            max_poll_attempts: 60,
            outline_retries: 1,
            backoff: BackoffConfig::none(),
        }
    }
}

impl Config {
    pub fn images_dir(&self) -> PathBuf {
        self.temp_dir.join("images")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.temp_dir.join("audio")
    }

    /// A fresh execution context using this configuration's timeout and backoff.
    pub fn exec_ctx(&self) -> ExecCtx {
        ExecCtx::builder()
            .timeout(self.request_timeout)
            .backoff(self.backoff.clone())
            .build()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |k: &Option<String>| k.as_ref().map(|_| "***");
        f.debug_struct("Config")
            .field("image_provider", &self.image_provider)
            .field("image_provider_fallback", &self.image_provider_fallback)
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("freepik_api_key", &redact(&self.freepik_api_key))
            .field("elevenlabs_api_key", &redact(&self.elevenlabs_api_key))
            .field("elevenlabs_voice_id", &self.elevenlabs_voice_id)
            .field("vision_models", &self.vision_models)
            .field("gemini_model", &self.gemini_model)
            .field("aspect_ratio", &self.aspect_ratio)
            .field("reference_strength", &self.reference_strength)
            .field("temp_dir", &self.temp_dir)
            .field("request_timeout", &self.request_timeout)
            .field("request_deadline", &self.request_deadline)
            .field("poll_interval", &self.poll_interval)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .field("outline_retries", &self.outline_retries)
            .finish()
    }
}

/// Normalize a credential: blank values and the sample-file placeholders
/// (`your_..._api_key_here`) count as absent.
pub fn credential(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() || (value.starts_with("your_") && value.ends_with("_here")) {
        return None;
    }
    Some(value.to_string())
}

/// Parse a provider selector, falling back to `default` on anything unknown.
pub fn provider_or(value: Option<&str>, default: ProviderKind) -> ProviderKind {
    parse_provider(value).unwrap_or(default)
}

/// Parse an optional provider selector; blank or unknown means none.
pub fn parse_provider(value: Option<&str>) -> Option<ProviderKind> {
    let value = value?;
    match value.parse() {
        Ok(kind) => Some(kind),
        Err(e) => {
            if !value.trim().is_empty() {
                tracing::warn!(error = %e, "ignoring image provider selector");
            }
            None
        }
    }
}
