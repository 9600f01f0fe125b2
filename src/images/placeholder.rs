//! Placeholder images from a public stock-photo service.
//!
//! Always available. The seed is derived from the prompt so the same prompt
//! and aspect ratio always map to the same image.

use async_trait::async_trait;
use std::time::Instant;

use super::{GeneratedImage, ImageProvider, ImageReference, ProviderKind};
use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::types::ImageGenerationOptions;

const DEFAULT_BASE_URL: &str = "https://picsum.photos";

#[derive(Debug, Clone)]
pub struct PlaceholderProvider {
    base_url: String,
}

impl PlaceholderProvider {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// The URL for `options`. Infallible, so the registry can always end here.
    pub fn url_for(&self, options: &ImageGenerationOptions) -> String {
        let seed = prompt_seed(&options.prompt);
        let (width, height) = options.aspect_ratio.dimensions();
        format!("{}/seed/{}/{}/{}", self.base_url, seed, width, height)
    }
}

impl Default for PlaceholderProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// 31-multiplier rolling hash over UTF-16 code units, wrapped to 32 bits.
///
/// Returns the magnitude so seeds are never negative.
pub fn prompt_seed(prompt: &str) -> u32 {
    prompt
        .encode_utf16()
        .fold(0i32, |hash, unit| {
            hash.wrapping_shl(5)
                .wrapping_sub(hash)
                .wrapping_add(unit as i32)
        })
        .unsigned_abs()
}

#[async_trait]
impl ImageProvider for PlaceholderProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Placeholder
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        _ctx: &ExecCtx,
        options: &ImageGenerationOptions,
    ) -> Result<GeneratedImage> {
        let started = Instant::now();
        Ok(GeneratedImage {
            reference: ImageReference::Url(self.url_for(options)),
            provider: ProviderKind::Placeholder,
            duration: started.elapsed(),
        })
    }
}
