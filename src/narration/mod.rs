//! Page narration with an on-disk, content-addressed cache.
//!
//! [`NarrationCache::get_audio_url`] never fails: a missing credential or a
//! synthesis error turns into [`NarrationOutcome::UseLocalFallback`], which
//! tells the client to read the page with its own speech engine.
//!
//! Audio files are named `{sha256(text)[..12]}_p{page}.mp3`, so identical
//! text is synthesized once per page position across all requests.

pub mod elevenlabs;

pub use elevenlabs::ElevenLabsBackend;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::exec_ctx::ExecCtx;

/// A text-to-speech service.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn SpeechBackend>`.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Whether the backend has a credential. Unconfigured backends are never called.
    fn is_configured(&self) -> bool;

    /// Synthesize `text`, returning MPEG audio bytes.
    async fn synthesize(&self, ctx: &ExecCtx, text: &str) -> Result<Vec<u8>>;

    fn name(&self) -> &'static str;
}

/// Result of a narration lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrationOutcome {
    Audio { audio_url: String },
    /// Narrate on the client instead.
    UseLocalFallback,
}

impl NarrationOutcome {
    pub fn audio_url(&self) -> Option<&str> {
        match self {
            NarrationOutcome::Audio { audio_url } => Some(audio_url),
            NarrationOutcome::UseLocalFallback => None,
        }
    }
}

/// Cache key for `text` narrated at `page_index`.
pub fn cache_key(text: &str, page_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    format!("{}_p{}", &hex[..12], page_index)
}

pub struct NarrationCache {
    backend: Arc<dyn SpeechBackend>,
    dir: PathBuf,
    url_prefix: String,
    /// Keys known to be on disk, with their URL.
    memo: Mutex<HashMap<String, String>>,
    /// One async lock per key being synthesized.
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for NarrationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrationCache")
            .field("backend", &self.backend.name())
            .field("dir", &self.dir)
            .field("url_prefix", &self.url_prefix)
            .finish()
    }
}

impl NarrationCache {
    pub fn new(
        backend: Arc<dyn SpeechBackend>,
        dir: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            dir: dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
            memo: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }

    fn remembered(&self, key: &str) -> Option<String> {
        self.memo.lock().ok()?.get(key).cloned()
    }

    fn remember(&self, key: &str, url: &str) {
        if let Ok(mut memo) = self.memo.lock() {
            memo.insert(key.to_string(), url.to_string());
        }
    }

    /// URL if the key is memoized or its file exists.
    async fn lookup(&self, key: &str, path: &Path, url: &str) -> Option<String> {
        if let Some(url) = self.remembered(key) {
            return Some(url);
        }
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            self.remember(key, url);
            return Some(url.to_string());
        }
        None
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        match self.inflight.lock() {
            Ok(mut map) => map.entry(key.to_string()).or_default().clone(),
            // Poisoned map: give up on deduplication rather than fail.
            Err(_) => Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn release_key(&self, key: &str) {
        if let Ok(mut map) = self.inflight.lock() {
            map.remove(key);
        }
    }

    /// Narration for `text` at `page_index`, synthesizing on a miss.
    pub async fn get_audio_url(
        &self,
        ctx: &ExecCtx,
        text: &str,
        page_index: usize,
    ) -> NarrationOutcome {
        let key = cache_key(text, page_index);
        let filename = format!("{key}.mp3");
        let path = self.dir.join(&filename);
        let url = format!("{}/{}", self.url_prefix, filename);

        if let Some(audio_url) = self.lookup(&key, &path, &url).await {
            debug!(key = %key, "narration cache hit");
            return NarrationOutcome::Audio { audio_url };
        }

        if !self.backend.is_configured() {
            debug!(backend = self.backend.name(), "speech backend not configured");
            return NarrationOutcome::UseLocalFallback;
        }

        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        // Someone else may have finished while we waited.
        if let Some(audio_url) = self.lookup(&key, &path, &url).await {
            return NarrationOutcome::Audio { audio_url };
        }

        let outcome = self.synthesize_and_store(ctx, text, &key, &path, url).await;
        self.release_key(&key);
        outcome
    }

    async fn synthesize_and_store(
        &self,
        ctx: &ExecCtx,
        text: &str,
        key: &str,
        path: &Path,
        url: String,
    ) -> NarrationOutcome {
        let audio = match self.backend.synthesize(ctx, text).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!(backend = self.backend.name(), key, error = %e, "speech synthesis failed");
                return NarrationOutcome::UseLocalFallback;
            }
        };

        let written = match tokio::fs::create_dir_all(&self.dir).await {
            Ok(()) => tokio::fs::write(path, &audio).await,
            Err(e) => Err(e),
        };

        match written {
            Ok(()) => {
                info!(key, size = audio.len(), "narration cached");
                self.remember(key, &url);
                NarrationOutcome::Audio { audio_url: url }
            }
            Err(e) => {
                warn!(key, error = %e, "could not cache narration, returning inline audio");
                NarrationOutcome::Audio {
                    audio_url: format!("data:audio/mpeg;base64,{}", STANDARD.encode(&audio)),
                }
            }
        }
    }

    /// Narrate a batch of pages with at most `limit` syntheses in flight.
    ///
    /// Outcomes come back in page order; page `i` uses index `i`.
    pub async fn preload<S: AsRef<str>>(
        &self,
        ctx: &ExecCtx,
        pages: &[S],
        limit: usize,
    ) -> Vec<NarrationOutcome> {
        stream::iter(pages.iter().enumerate())
            .map(|(idx, text)| self.get_audio_url(ctx, text.as_ref(), idx))
            .buffered(limit.max(1))
            .collect()
            .await
    }
}
