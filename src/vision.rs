//! Image description through a vision model, with model-candidate fallback.
//!
//! [`VisionDescriber`] tries its model ids in order. Only
//! [`PipelineError::ModelUnavailable`] moves on to the next candidate; any
//! other failure is returned as-is so an auth or quota problem is never
//! hidden behind "no model available".

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{self, AnthropicBackend, ChatMessage, VisionBackend, VisionRequest};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::output_parser::{self, JsonObject, ParseError};
use crate::types::{CharacterProfile, GenerationRequest};

const CHARACTER_PROMPT: &str = r#"Look at this clay figure made by a child and describe it as a character.

Respond in JSON format:
{
  "name": "A fun, friendly name for the character",
  "color": "The main colors of the clay",
  "shape": "The overall shape and notable features",
  "characterTraits": ["three", "personality", "traits"],
  "tone": "The mood the character gives off"
}

Keep every value short and suitable for ages 4-8."#;

/// What the model said, plus the JSON extracted from it when one was expected.
#[derive(Debug)]
pub struct Description {
    /// First text block of the response.
    pub text: String,
    /// Model that answered.
    pub model: String,
    pub extracted: Option<JsonObject>,
    /// Why extraction failed; `text` is still usable.
    pub extraction_error: Option<ParseError>,
}

/// A figurine described as a character.
///
/// `character` is present only when every profile field came back;
/// otherwise `parse_error` explains why and `description` holds the raw text.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterDescription {
    pub description: String,
    #[serde(skip)]
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character: Option<CharacterProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

pub struct VisionDescriber {
    backend: Arc<dyn VisionBackend>,
    models: Vec<String>,
    max_tokens: u32,
}

impl std::fmt::Debug for VisionDescriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionDescriber")
            .field("backend", &self.backend.name())
            .field("models", &self.models)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl VisionDescriber {
    pub fn new(backend: Arc<dyn VisionBackend>, models: Vec<String>) -> Self {
        Self {
            backend,
            models,
            max_tokens: 2000,
        }
    }

    /// Anthropic backend with the configured key and model candidates.
    pub fn from_config(config: &Config) -> Self {
        let backend = AnthropicBackend::new(config.anthropic_api_key.clone());
        Self::new(Arc::new(backend), config.vision_models.clone())
            .with_max_tokens(config.vision_max_tokens)
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Describe `image` following `prompt`.
    ///
    /// With `expects_json`, the answer is also run through the extractor;
    /// extraction failure is reported in the result, not as an error.
    pub async fn describe(
        &self,
        ctx: &ExecCtx,
        image: &GenerationRequest,
        prompt: &str,
        expects_json: bool,
    ) -> Result<Description> {
        self.describe_turns(ctx, image, prompt, &[], expects_json)
            .await
    }

    /// Like [`describe`](Self::describe), continuing a conversation with
    /// `follow_ups` after the initial image and prompt.
    pub async fn describe_turns(
        &self,
        ctx: &ExecCtx,
        image: &GenerationRequest,
        prompt: &str,
        follow_ups: &[ChatMessage],
        expects_json: bool,
    ) -> Result<Description> {
        if self.models.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "no vision model candidates configured".into(),
            ));
        }

        let image_base64 = image.to_base64();
        let mut last_unavailable = None;

        for model in &self.models {
            let request = VisionRequest {
                model: model.clone(),
                image_base64: image_base64.clone(),
                media_type: image.mime_type.clone(),
                prompt: prompt.to_string(),
                follow_ups: follow_ups.to_vec(),
                max_tokens: self.max_tokens,
            };

            match backend::with_backoff(&self.backend, ctx, &request).await {
                Ok(response) => {
                    let text = response
                        .first_text()
                        .ok_or(PipelineError::NoTextContent)?
                        .to_string();
                    info!(model = %model, chars = text.len(), "vision model answered");

                    let (extracted, extraction_error) = if expects_json {
                        match output_parser::extract(&text) {
                            Ok(object) => (Some(object), None),
                            Err(e) => {
                                debug!(model = %model, error = %e, "no JSON in vision answer");
                                (None, Some(e))
                            }
                        }
                    } else {
                        (None, None)
                    };

                    return Ok(Description {
                        text,
                        model: response.model,
                        extracted,
                        extraction_error,
                    });
                }
                Err(e) if e.is_model_unavailable() => {
                    warn!(model = %model, error = %e, "vision model unavailable, trying next");
                    last_unavailable = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(PipelineError::AllModelsUnavailable {
            last: Box::new(last_unavailable.unwrap_or(PipelineError::NoTextContent)),
        })
    }

    /// Describe a figurine as a [`CharacterProfile`].
    pub async fn describe_character(
        &self,
        ctx: &ExecCtx,
        image: &GenerationRequest,
    ) -> Result<CharacterDescription> {
        let description = self.describe(ctx, image, CHARACTER_PROMPT, true).await?;

        let (character, parse_error) = match (&description.extracted, &description.extraction_error) {
            (Some(object), _) => match profile_from(object) {
                Ok(profile) => (Some(profile), None),
                Err(e) => (None, Some(e.to_string())),
            },
            (None, Some(e)) => (None, Some(e.to_string())),
            (None, None) => (None, Some(ParseError::EmptyResponse.to_string())),
        };

        Ok(CharacterDescription {
            description: description.text,
            model: description.model,
            character,
            parse_error,
        })
    }
}

/// All five profile fields are required; partial profiles are rejected.
fn profile_from(object: &JsonObject) -> Result<CharacterProfile> {
    serde_json::from_value(serde_json::Value::Object(object.clone()))
        .map_err(|e| PipelineError::InvalidProfile(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    const MODELS: [&str; 3] = ["model-a", "model-b", "model-c"];

    fn describer(mock: &Arc<MockBackend>) -> VisionDescriber {
        let backend: Arc<dyn VisionBackend> = mock.clone();
        VisionDescriber::new(backend, MODELS.iter().map(|m| m.to_string()).collect())
    }

    fn image() -> GenerationRequest {
        GenerationRequest::new(b"jpeg".to_vec(), "image/jpeg")
    }

    #[tokio::test]
    async fn test_skips_unavailable_models() {
        let mock = Arc::new(MockBackend::fixed("A red clay dragon.").with_unavailable(&["model-a"]));
        let ctx = ExecCtx::builder().build();

        let desc = describer(&mock)
            .describe(&ctx, &image(), "describe", false)
            .await
            .unwrap();
        assert_eq!(desc.text, "A red clay dragon.");
        assert_eq!(desc.model, "model-b");
        assert!(desc.extracted.is_none());
        assert_eq!(mock.models_called(), vec!["model-a", "model-b"]);
    }

    #[tokio::test]
    async fn test_other_errors_abort_immediately() {
        let mock = Arc::new(MockBackend::fixed("ok").with_failure("model-a", 401));
        let ctx = ExecCtx::builder().build();

        let err = describer(&mock)
            .describe(&ctx, &image(), "describe", false)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::HttpError { status: 401, .. }));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_all_unavailable_reports_last_cause() {
        let mock = Arc::new(MockBackend::fixed("ok").with_unavailable(&MODELS));
        let ctx = ExecCtx::builder().build();

        let err = describer(&mock)
            .describe(&ctx, &image(), "describe", false)
            .await
            .unwrap_err();
        match err {
            PipelineError::AllModelsUnavailable { last } => {
                assert!(matches!(*last, PipelineError::ModelUnavailable { ref model, .. } if model == "model-c"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_request_carries_image_and_prompt() {
        let mock = Arc::new(MockBackend::fixed("ok"));
        let ctx = ExecCtx::builder().build();
        describer(&mock)
            .describe(&ctx, &image(), "what is this?", false)
            .await
            .unwrap();

        let req = mock.last_request().unwrap();
        assert_eq!(req.image_base64, "anBlZw==");
        assert_eq!(req.media_type, "image/jpeg");
        assert_eq!(req.prompt, "what is this?");
    }

    #[tokio::test]
    async fn test_json_extraction_failure_keeps_text() {
        let mock = Arc::new(MockBackend::fixed("I see a blue blob, no JSON today."));
        let ctx = ExecCtx::builder().build();

        let desc = describer(&mock)
            .describe(&ctx, &image(), "describe", true)
            .await
            .unwrap();
        assert_eq!(desc.text, "I see a blue blob, no JSON today.");
        assert!(desc.extracted.is_none());
        assert!(matches!(desc.extraction_error, Some(ParseError::Unparseable { .. })));
    }

    #[tokio::test]
    async fn test_describe_character_full_profile() {
        let answer = r#"```json
{"name": "Blobby", "color": "blue", "shape": "round", "characterTraits": ["brave", "kind"], "tone": "cheerful"}
```"#;
        let mock = Arc::new(MockBackend::fixed(answer));
        let ctx = ExecCtx::builder().build();

        let result = describer(&mock).describe_character(&ctx, &image()).await.unwrap();
        let character = result.character.unwrap();
        assert_eq!(character.name, "Blobby");
        assert_eq!(character.character_traits, vec!["brave", "kind"]);
        assert!(result.parse_error.is_none());
    }

    #[tokio::test]
    async fn test_describe_character_partial_profile_is_parse_error() {
        let answer = r#"{"name": "Blobby", "color": "blue", "shape": "round", "tone": "cheerful"}"#;
        let mock = Arc::new(MockBackend::fixed(answer));
        let ctx = ExecCtx::builder().build();

        let result = describer(&mock).describe_character(&ctx, &image()).await.unwrap();
        assert!(result.character.is_none());
        assert!(result.parse_error.unwrap().contains("characterTraits"));
        assert_eq!(result.description, answer);

        let json = serde_json::to_value(CharacterDescription {
            description: "d".into(),
            model: "m".into(),
            character: None,
            parse_error: Some("bad".into()),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"description": "d", "parseError": "bad"}));
    }
}
