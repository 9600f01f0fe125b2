//! Re-serving cached images and narration.
//!
//! Filenames are checked before any filesystem access: word characters,
//! dashes and dots only, and no leading dot. That rules out separators,
//! `..` and hidden files.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use regex::Regex;
use std::path::Path as FsPath;
use std::sync::LazyLock;
use tracing::warn;

use super::handlers::ApiError;
use super::AppState;

static SAFE_FILENAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\-.]+$").expect("valid filename pattern"));

const CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

pub fn is_safe_filename(filename: &str) -> bool {
    SAFE_FILENAME.is_match(filename) && !filename.starts_with('.')
}

/// Content type for a cached image, by extension.
pub fn image_content_type(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

async fn serve_file(
    dir: &FsPath,
    filename: &str,
    content_type: &'static str,
) -> Result<Response, ApiError> {
    if !is_safe_filename(filename) {
        warn!(filename, "rejected asset filename");
        return Err(ApiError::BadRequest("Invalid filename".into()));
    }

    let path = dir.join(filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok((
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, CACHE_CONTROL),
            ],
            bytes,
        )
            .into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ApiError::NotFound(format!("{filename} not found")))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read asset");
            Err(ApiError::Internal("Failed to read file".into()))
        }
    }
}

/// GET /temp/images/:filename
pub async fn serve_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    serve_file(&state.images_dir, &filename, image_content_type(&filename)).await
}

/// GET /temp/audio/:filename
pub async fn serve_audio(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, ApiError> {
    serve_file(&state.audio_dir, &filename, "audio/mpeg").await
}
