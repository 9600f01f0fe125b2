//! JSON API handlers.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use super::AppState;
use crate::error::PipelineError;
use crate::narration::NarrationOutcome;
use crate::types::GenerationRequest;
use crate::vision::CharacterDescription;

/// Errors surfaced to API clients as `{ "error": message }`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
    /// Body extraction failed; keeps axum's status (400, 413, 415, ...).
    Rejected(StatusCode, String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            ApiError::Rejected(status, msg) => (status, msg),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidImage(_) => ApiError::BadRequest(err.to_string()),
            other => {
                error!(error = %other, "request failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(rejection.status(), rejection.body_text())
    }
}

/// Body of the image endpoints. Both field names are accepted.
#[derive(Debug, Deserialize)]
pub struct ImageBody {
    #[serde(default, alias = "imageBase64")]
    pub image: Option<String>,
}

impl ImageBody {
    fn decode(self, missing: &str) -> Result<GenerationRequest, ApiError> {
        let image = self
            .image
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest(missing.to_string()))?;
        Ok(GenerationRequest::from_base64(&image)?)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarrationBody {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub page_index: usize,
}

/// POST /api/generate
pub async fn generate_story(
    State(state): State<AppState>,
    body: Result<Json<ImageBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let request = body.decode("No image provided")?;
    let (ctx, _cancel) = state.request_ctx();

    let story = state.pipeline.generate_story(&ctx, &request).await?;
    info!(story_id = %story.id, "story delivered");
    Ok(Json(json!({ "story": story })))
}

/// POST /api/tts
///
/// Never fails once `text` is present: synthesis problems come back as
/// `{ "useWebSpeech": true }`.
pub async fn narrate(
    State(state): State<AppState>,
    body: Result<Json<NarrationBody>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let text = body
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("No text provided".into()))?;
    let (ctx, _cancel) = state.request_ctx();

    let outcome = state
        .narration
        .get_audio_url(&ctx, &text, body.page_index)
        .await;
    Ok(Json(match outcome {
        NarrationOutcome::Audio { audio_url } => json!({ "audioUrl": audio_url }),
        NarrationOutcome::UseLocalFallback => json!({ "useWebSpeech": true }),
    }))
}

/// POST /api/analyze-image
pub async fn analyze_image(
    State(state): State<AppState>,
    body: Result<Json<ImageBody>, JsonRejection>,
) -> Result<Json<CharacterDescription>, ApiError> {
    let Json(body) = body?;
    let request = body.decode("Image data is required")?;

    let describer = state.pipeline.describer();
    if !describer.is_configured() {
        return Err(ApiError::Internal("API key not configured on server".into()));
    }

    let (ctx, _cancel) = state.request_ctx();
    let description = describer.describe_character(&ctx, &request).await?;
    info!(model = %description.model, parsed = description.character.is_some(), "image analyzed");
    Ok(Json(description))
}

/// GET /api/providers
pub async fn providers(State(state): State<AppState>) -> Json<Value> {
    let images = state.pipeline.images();
    Json(json!({
        "primary": images.primary_kind(),
        "fallback": images.fallback_kind(),
        "active": images.select_active().kind(),
        "providers": images.provider_status(),
        "narration": state.narration.is_configured(),
    }))
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_body_accepts_both_names() {
        let a: ImageBody = serde_json::from_str(r#"{"image": "aGVsbG8="}"#).unwrap();
        let b: ImageBody = serde_json::from_str(r#"{"imageBase64": "aGVsbG8="}"#).unwrap();
        assert_eq!(a.image, b.image);
    }

    #[test]
    fn test_blank_image_is_bad_request() {
        let body = ImageBody {
            image: Some("   ".into()),
        };
        assert!(matches!(body.decode("missing"), Err(ApiError::BadRequest(ref m)) if m == "missing"));
    }

    #[test]
    fn test_undecodable_image_is_bad_request() {
        let body = ImageBody {
            image: Some("%%%".into()),
        };
        assert!(matches!(body.decode("missing"), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_narration_body_defaults_page_index() {
        let body: NarrationBody = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        assert_eq!(body.page_index, 0);
    }
}
