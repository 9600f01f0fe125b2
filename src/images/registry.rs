//! Provider selection with fallback.
//!
//! Order per request: the primary if it is available, otherwise the fallback
//! if it is available, otherwise the placeholder. A primary that fails gets
//! one fallback attempt before the placeholder. The placeholder cannot fail,
//! so [`ImageProviderRegistry::generate_image`] always yields a URL.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::{
    FreepikProvider, GeminiProvider, ImageProvider, ImageReference, ImageStore, PlaceholderProvider,
    ProviderKind,
};
use crate::config::Config;
use crate::error::PipelineError;
use crate::exec_ctx::ExecCtx;
use crate::types::ImageGenerationOptions;

/// Outcome of one image request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResult {
    /// Local URL for provider output, or the placeholder URL.
    pub url: String,
    pub provider: ProviderKind,
    pub duration_ms: u64,
}

/// Availability of one configured provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub name: ProviderKind,
    pub available: bool,
}

pub struct ImageProviderRegistry {
    primary: Arc<dyn ImageProvider>,
    fallback: Option<Arc<dyn ImageProvider>>,
    placeholder: PlaceholderProvider,
    store: ImageStore,
}

impl std::fmt::Debug for ImageProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageProviderRegistry")
            .field("primary", &self.primary.kind())
            .field("fallback", &self.fallback.as_ref().map(|p| p.kind()))
            .field("store", &self.store)
            .finish()
    }
}

impl ImageProviderRegistry {
    pub fn new(
        primary: Arc<dyn ImageProvider>,
        fallback: Option<Arc<dyn ImageProvider>>,
        store: ImageStore,
    ) -> Self {
        // A fallback identical to the primary would just repeat the failure.
        let fallback = fallback.filter(|f| f.kind() != primary.kind());
        Self {
            primary,
            fallback,
            placeholder: PlaceholderProvider::new(),
            store,
        }
    }

    /// Build the configured primary and fallback providers.
    pub fn from_config(config: &Config) -> Self {
        let primary = Self::build_provider(config, config.image_provider);
        let fallback = config
            .image_provider_fallback
            .map(|kind| Self::build_provider(config, kind));
        let store = ImageStore::new(config.images_dir(), config.images_url_prefix.clone());
        Self::new(primary, fallback, store)
    }

    fn build_provider(config: &Config, kind: ProviderKind) -> Arc<dyn ImageProvider> {
        match kind {
            ProviderKind::Freepik => Arc::new(
                FreepikProvider::new(config.freepik_api_key.clone())
                    .with_polling(config.poll_interval, config.max_poll_attempts),
            ),
            ProviderKind::Gemini => Arc::new(
                GeminiProvider::new(config.gemini_api_key.clone())
                    .with_model(config.gemini_model.clone()),
            ),
            ProviderKind::Placeholder => Arc::new(PlaceholderProvider::new()),
        }
    }

    pub fn primary_kind(&self) -> ProviderKind {
        self.primary.kind()
    }

    pub fn fallback_kind(&self) -> Option<ProviderKind> {
        self.fallback.as_ref().map(|p| p.kind())
    }

    fn available_fallback(&self) -> Option<&dyn ImageProvider> {
        self.fallback.as_deref().filter(|p| p.is_available())
    }

    /// The provider a request would start with.
    pub fn select_active(&self) -> &dyn ImageProvider {
        if self.primary.is_available() {
            return self.primary.as_ref();
        }
        self.available_fallback()
            .unwrap_or(&self.placeholder as &dyn ImageProvider)
    }

    /// Generate one image. Never fails; the placeholder is the last resort.
    pub async fn generate_image(
        &self,
        ctx: &ExecCtx,
        options: &ImageGenerationOptions,
    ) -> ImageResult {
        let started = Instant::now();
        let active = self.select_active();

        if active.kind() != ProviderKind::Placeholder {
            match self.try_provider(ctx, active, options).await {
                Ok(result) => return result,
                Err(e) => {
                    warn!(provider = %active.kind(), error = %e, "image provider failed");
                    let retry_fallback = self.primary.is_available()
                        && !matches!(e, PipelineError::Cancelled);
                    if let Some(fallback) = self.available_fallback().filter(|_| retry_fallback) {
                        info!(provider = %fallback.kind(), "trying fallback image provider");
                        match self.try_provider(ctx, fallback, options).await {
                            Ok(result) => return result,
                            Err(e) => {
                                warn!(provider = %fallback.kind(), error = %e, "fallback image provider failed");
                            }
                        }
                    }
                }
            }
        }

        ImageResult {
            url: self.placeholder.url_for(options),
            provider: ProviderKind::Placeholder,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn try_provider(
        &self,
        ctx: &ExecCtx,
        provider: &dyn ImageProvider,
        options: &ImageGenerationOptions,
    ) -> crate::Result<ImageResult> {
        let image = provider.generate(ctx, options).await?;
        // Placeholder URLs are stable external references; keep them as-is.
        let url = match &image.reference {
            ImageReference::Url(url) if image.provider == ProviderKind::Placeholder => url.clone(),
            _ => self.store.persist(ctx, &image).await,
        };
        info!(provider = %image.provider, duration_ms = image.duration.as_millis() as u64, "image generated");
        Ok(ImageResult {
            url,
            provider: image.provider,
            duration_ms: image.duration.as_millis() as u64,
        })
    }

    /// Availability of the configured providers, placeholder last.
    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        let mut statuses = vec![ProviderStatus {
            name: self.primary.kind(),
            available: self.primary.is_available(),
        }];
        if let Some(ref fallback) = self.fallback {
            statuses.push(ProviderStatus {
                name: fallback.kind(),
                available: fallback.is_available(),
            });
        }
        if !statuses.iter().any(|s| s.name == ProviderKind::Placeholder) {
            statuses.push(ProviderStatus {
                name: ProviderKind::Placeholder,
                available: true,
            });
        }
        statuses
    }
}
