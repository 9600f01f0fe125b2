//! Local copies of generated images.
//!
//! Remote results are downloaded and inline results decoded into the images
//! directory under `{provider}_{millis}_{seq}.{ext}`, so callers never depend
//! on how long a provider keeps its CDN links alive.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::{GeneratedImage, ImageReference, ProviderKind};
use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::types::CachedAsset;

#[derive(Debug)]
pub struct ImageStore {
    dir: PathBuf,
    url_prefix: String,
    sequence: AtomicU64,
}

impl ImageStore {
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Unique within the process; the sequence is shared by all requests.
    fn next_key(&self, provider: ProviderKind) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let millis = chrono::Utc::now().timestamp_millis();
        format!("{provider}_{millis}_{seq}")
    }

    async fn fetch(ctx: &ExecCtx, reference: &ImageReference) -> Result<(Vec<u8>, String)> {
        match reference {
            ImageReference::Inline { bytes, mime_type } => Ok((bytes.clone(), mime_type.clone())),
            ImageReference::Url(url) => {
                ctx.check_cancelled()?;
                let resp = ctx.client.get(url).send().await?;
                if !resp.status().is_success() {
                    let status = resp.status().as_u16();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(PipelineError::HttpError {
                        status,
                        body,
                        retry_after: None,
                    });
                }
                let mime_type = resp
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("image/png")
                    .to_string();
                Ok((resp.bytes().await?.to_vec(), mime_type))
            }
        }
    }

    /// Download or decode `image` and write it to disk.
    pub async fn save(&self, ctx: &ExecCtx, image: &GeneratedImage) -> Result<CachedAsset> {
        let (bytes, mime_type) = Self::fetch(ctx, &image.reference).await?;
        if bytes.is_empty() {
            return Err(PipelineError::EmptyResult(image.provider.as_str()));
        }

        let key = self.next_key(image.provider);
        let filename = format!("{key}.{}", extension_for(&mime_type));
        tokio::fs::create_dir_all(&self.dir).await?;
        let local_path = self.dir.join(&filename);
        tokio::fs::write(&local_path, &bytes).await?;
        debug!(path = %local_path.display(), size = bytes.len(), "image saved");

        Ok(CachedAsset {
            key,
            local_path,
            url: format!("{}/{}", self.url_prefix, filename),
        })
    }

    /// Like [`save`](Self::save), but never fails.
    ///
    /// When the copy cannot be made, the provider's own reference is returned:
    /// the remote URL, or a data URL for inline bytes.
    pub async fn persist(&self, ctx: &ExecCtx, image: &GeneratedImage) -> String {
        match self.save(ctx, image).await {
            Ok(asset) => asset.url,
            Err(e) => {
                warn!(provider = %image.provider, error = %e, "could not cache image, using provider reference");
                match &image.reference {
                    ImageReference::Url(url) => url.clone(),
                    ImageReference::Inline { bytes, mime_type } => {
                        format!("data:{mime_type};base64,{}", STANDARD.encode(bytes))
                    }
                }
            }
        }
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    let mime = mime_type.split(';').next().unwrap_or("").trim();
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;
    use axum::routing::get;
    use axum::Router;
    use std::time::Duration;

    fn inline(bytes: &[u8], mime: &str) -> GeneratedImage {
        GeneratedImage {
            reference: ImageReference::Inline {
                bytes: bytes.to_vec(),
                mime_type: mime.into(),
            },
            provider: ProviderKind::Gemini,
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("image/webp; charset=binary"), "webp");
        assert_eq!(extension_for("application/octet-stream"), "png");
    }

    #[tokio::test]
    async fn test_save_inline_writes_tagged_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path().join("images"), "/temp/images/");
        let ctx = ExecCtx::builder().build();

        let asset = store.save(&ctx, &inline(b"png-bytes", "image/png")).await.unwrap();
        assert!(asset.key.starts_with("gemini_"));
        assert!(asset.key.ends_with("_1"));
        assert!(asset.url.starts_with("/temp/images/gemini_"));
        assert!(asset.url.ends_with(".png"));
        assert_eq!(std::fs::read(&asset.local_path).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_sequence_keeps_names_unique() {
        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), "/temp/images");
        let ctx = ExecCtx::builder().build();
        let image = inline(b"x", "image/jpeg");

        let (a, b) = tokio::join!(store.save(&ctx, &image), store.save(&ctx, &image));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.local_path, b.local_path);
        assert!(a.url.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_save_downloads_remote_url() {
        let app = Router::new().route(
            "/img.webp",
            get(|| async { ([(header::CONTENT_TYPE, "image/webp")], b"remote".to_vec()) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let store = ImageStore::new(dir.path(), "/temp/images");
        let ctx = ExecCtx::builder().build();
        let image = GeneratedImage {
            reference: ImageReference::Url(format!("http://{addr}/img.webp")),
            provider: ProviderKind::Freepik,
            duration: Duration::ZERO,
        };

        let url = store.persist(&ctx, &image).await;
        assert!(url.starts_with("/temp/images/freepik_"));
        assert!(url.ends_with(".webp"));
    }

    #[tokio::test]
    async fn test_persist_falls_back_when_write_fails() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the directory should be.
        let blocker = dir.path().join("images");
        std::fs::write(&blocker, b"").unwrap();
        let store = ImageStore::new(&blocker, "/temp/images");
        let ctx = ExecCtx::builder().build();

        let url = store.persist(&ctx, &inline(b"hello", "image/png")).await;
        assert_eq!(url, "data:image/png;base64,aGVsbG8=");

        let remote = GeneratedImage {
            reference: ImageReference::Url("http://127.0.0.1:9/gone.png".into()),
            provider: ProviderKind::Freepik,
            duration: Duration::ZERO,
        };
        assert_eq!(store.persist(&ctx, &remote).await, "http://127.0.0.1:9/gone.png");
    }
}
