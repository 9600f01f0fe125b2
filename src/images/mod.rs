//! Image generation providers.
//!
//! Every backend implements [`ImageProvider`]; the
//! [`ImageProviderRegistry`] picks one per request (primary, then fallback,
//! then the always-available placeholder) and persists results through the
//! [`ImageStore`].
//!
//! | Provider | Style |
//! |----------|-------|
//! | [`GeminiProvider`] | synchronous, returns inline base64 bytes |
//! | [`FreepikProvider`] | submit a task, poll until terminal |
//! | [`PlaceholderProvider`] | deterministic stock image URL, no network |

pub mod freepik;
pub mod gemini;
pub mod placeholder;
pub mod registry;
pub mod store;

pub use freepik::FreepikProvider;
pub use gemini::GeminiProvider;
pub use placeholder::PlaceholderProvider;
pub use registry::{ImageProviderRegistry, ImageResult, ProviderStatus};
pub use store::ImageStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::types::ImageGenerationOptions;

/// Selector for the configured image backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Freepik,
    Gemini,
    Placeholder,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Freepik,
        ProviderKind::Gemini,
        ProviderKind::Placeholder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Freepik => "freepik",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Placeholder => "placeholder",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "freepik" => Ok(ProviderKind::Freepik),
            "gemini" => Ok(ProviderKind::Gemini),
            "placeholder" => Ok(ProviderKind::Placeholder),
            other => Err(format!("unknown image provider '{other}'")),
        }
    }
}

/// Where a provider left its image.
#[derive(Clone, PartialEq, Eq)]
pub enum ImageReference {
    /// Remote URL (provider CDN or placeholder service).
    Url(String),
    /// Bytes returned in the response body.
    Inline { bytes: Vec<u8>, mime_type: String },
}

impl std::fmt::Debug for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageReference::Url(url) => f.debug_tuple("Url").field(url).finish(),
            ImageReference::Inline { bytes, mime_type } => f
                .debug_struct("Inline")
                .field("bytes", &bytes.len())
                .field("mime_type", mime_type)
                .finish(),
        }
    }
}

/// Output of a single provider call.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub reference: ImageReference,
    pub provider: ProviderKind,
    pub duration: Duration,
}

/// An image generation backend.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn ImageProvider>`.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Which selector this provider answers to.
    fn kind(&self) -> ProviderKind;

    /// Whether the provider has what it needs (credentials) to be called.
    fn is_available(&self) -> bool;

    /// Generate one image.
    async fn generate(
        &self,
        ctx: &ExecCtx,
        options: &ImageGenerationOptions,
    ) -> Result<GeneratedImage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("Freepik".parse::<ProviderKind>(), Ok(ProviderKind::Freepik));
        assert_eq!(" gemini ".parse::<ProviderKind>(), Ok(ProviderKind::Gemini));
        assert!("dalle".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_kind_serde() {
        let json = serde_json::to_string(&ProviderKind::Placeholder).unwrap();
        assert_eq!(json, "\"placeholder\"");
    }
}
