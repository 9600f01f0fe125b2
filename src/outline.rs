//! Four-page story outlines written by the vision model.
//!
//! The answer must carry a title and exactly four pages, each with `text`
//! and `imagePrompt`. An answer that does not is sent back to the model with
//! the reason, up to the configured number of corrections.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::output_parser::{JsonObject, ParseError};
use crate::retry::{correction_turns, RetryConfig};
use crate::types::{GenerationRequest, OutlinePage, StoryOutline};
use crate::vision::VisionDescriber;

pub const PAGE_COUNT: usize = 4;

pub const DEFAULT_CHARACTER_DESCRIPTION: &str = "a cute clay character";

const STORY_PROMPT: &str = r#"You are a children's storyteller. Look at this clay creation made by a child and create a magical, age-appropriate story (for ages 4-8) featuring this character.

Create a story with EXACTLY 4 pages. Each page should have:
1. A short paragraph of text (2-3 sentences, simple vocabulary)
2. A description for an illustration

The story should:
- Have a clear beginning, middle, and end
- Be positive and uplifting
- Feature the clay creation as the main character
- Include a simple adventure or lesson
- Use the character's actual appearance (colors, shape, features you can see)

Respond in JSON format:
{
  "title": "Story Title",
  "characterDescription": "Detailed description of the clay character's appearance for consistent image generation (colors, shape, features, size)",
  "pages": [
    {
      "text": "Story text for page 1",
      "imagePrompt": "Detailed scene description for page 1"
    },
    ... (4 pages total)
  ]
}

IMPORTANT for imagePrompt:
- Describe the SCENE and ACTION, not the character (character will be added separately)
- Focus on: setting, mood, lighting, what's happening
- Style: children's book illustration, colorful, whimsical, friendly"#;

#[derive(Debug)]
pub struct StoryOutliner {
    describer: Arc<VisionDescriber>,
    retry: RetryConfig,
}

impl StoryOutliner {
    /// `corrections` is the number of re-prompts after the first answer.
    pub fn new(describer: Arc<VisionDescriber>, corrections: u32) -> Self {
        Self {
            describer,
            retry: RetryConfig::new(corrections).requiring_keys(&["title", "pages"]),
        }
    }

    pub fn describer(&self) -> &Arc<VisionDescriber> {
        &self.describer
    }

    /// Ask the model for an outline of a story about the figurine in `image`.
    pub async fn create_outline(
        &self,
        ctx: &ExecCtx,
        image: &GenerationRequest,
    ) -> Result<StoryOutline> {
        let mut follow_ups = Vec::new();
        let mut corrections = 0;

        loop {
            ctx.check_cancelled()?;
            let description = self
                .describer
                .describe_turns(ctx, image, STORY_PROMPT, &follow_ups, true)
                .await?;

            let extracted: std::result::Result<JsonObject, ParseError> =
                match (description.extracted, description.extraction_error) {
                    (Some(object), _) => Ok(object),
                    (None, Some(e)) => Err(e),
                    (None, None) => Err(ParseError::EmptyResponse),
                };

            let reason = match self.retry.check(&description.text, &extracted) {
                Some(reason) => reason,
                None => match extracted.as_ref().map_err(|e| e.to_string()).and_then(parse_outline) {
                    Ok(outline) => {
                        info!(title = %outline.title, corrections, "story outline ready");
                        return Ok(outline);
                    }
                    Err(reason) => reason,
                },
            };

            if corrections >= self.retry.max_retries {
                return Err(PipelineError::InvalidOutline(reason));
            }
            corrections += 1;
            warn!(attempt = corrections, reason = %reason, "outline rejected, asking for a correction");
            follow_ups.extend(correction_turns(&description.text, &reason));
        }
    }
}

/// Check the outline's shape and convert it.
pub fn parse_outline(object: &JsonObject) -> std::result::Result<StoryOutline, String> {
    let title = object
        .get("title")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or("'title' must be a non-empty string")?
        .to_string();

    let character_description = object
        .get("characterDescription")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_CHARACTER_DESCRIPTION)
        .to_string();

    let raw_pages = object
        .get("pages")
        .and_then(|v| v.as_array())
        .ok_or("'pages' must be an array")?;

    let mut pages = Vec::with_capacity(raw_pages.len());
    for (idx, page) in raw_pages.iter().enumerate() {
        let field = |name: &str| {
            page.get(name)
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or(format!("page {} is missing '{}'", idx + 1, name))
        };
        pages.push(OutlinePage {
            text: field("text")?,
            image_prompt: field("imagePrompt")?,
        });
    }

    if pages.len() != PAGE_COUNT {
        return Err(format!(
            "expected exactly {} pages, got {}",
            PAGE_COUNT,
            pages.len()
        ));
    }

    Ok(StoryOutline {
        title,
        character_description,
        pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, Role, VisionBackend};
    use crate::output_parser::extract;
    use serde_json::json;

    fn outline_json(pages: usize) -> String {
        let pages: Vec<_> = (1..=pages)
            .map(|i| json!({"text": format!("Page {i} text."), "imagePrompt": format!("scene {i}")}))
            .collect();
        json!({
            "title": "Blobby's Big Day",
            "characterDescription": "a round blue clay blob with googly eyes",
            "pages": pages,
        })
        .to_string()
    }

    fn outliner(mock: &Arc<MockBackend>, corrections: u32) -> StoryOutliner {
        let backend: Arc<dyn VisionBackend> = mock.clone();
        let describer = VisionDescriber::new(backend, vec!["model-a".into()]);
        StoryOutliner::new(Arc::new(describer), corrections)
    }

    fn image() -> GenerationRequest {
        GenerationRequest::new(b"img".to_vec(), "image/jpeg")
    }

    #[test]
    fn test_parse_outline_valid() {
        let object = extract(&outline_json(4)).unwrap();
        let outline = parse_outline(&object).unwrap();
        assert_eq!(outline.title, "Blobby's Big Day");
        assert_eq!(outline.pages.len(), 4);
        assert_eq!(outline.pages[2].image_prompt, "scene 3");
    }

    #[test]
    fn test_parse_outline_defaults_character_description() {
        let object = extract(
            r#"{"title": "T", "pages": [{"text": "a", "imagePrompt": "b"}, {"text": "a", "imagePrompt": "b"},
                {"text": "a", "imagePrompt": "b"}, {"text": "a", "imagePrompt": "b"}]}"#,
        )
        .unwrap();
        let outline = parse_outline(&object).unwrap();
        assert_eq!(outline.character_description, DEFAULT_CHARACTER_DESCRIPTION);
    }

    #[test]
    fn test_parse_outline_rejects_bad_shapes() {
        let wrong_count = extract(&outline_json(3)).unwrap();
        assert_eq!(
            parse_outline(&wrong_count).unwrap_err(),
            "expected exactly 4 pages, got 3"
        );

        let missing_prompt = extract(r#"{"title": "T", "pages": [{"text": "a"}]}"#).unwrap();
        assert_eq!(
            parse_outline(&missing_prompt).unwrap_err(),
            "page 1 is missing 'imagePrompt'"
        );

        let pages_not_array = extract(r#"{"title": "T", "pages": "four"}"#).unwrap();
        assert!(parse_outline(&pages_not_array).unwrap_err().contains("array"));
    }

    #[tokio::test]
    async fn test_create_outline_first_try() {
        let mock = Arc::new(MockBackend::fixed(format!("Here you go:\n{}", outline_json(4))));
        let ctx = ExecCtx::builder().build();

        let outline = outliner(&mock, 1).create_outline(&ctx, &image()).await.unwrap();
        assert_eq!(outline.pages.len(), 4);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_wrong_page_count_is_corrected() {
        let mock = Arc::new(MockBackend::new(vec![outline_json(3), outline_json(4)]));
        let ctx = ExecCtx::builder().build();

        let outline = outliner(&mock, 1).create_outline(&ctx, &image()).await.unwrap();
        assert_eq!(outline.pages.len(), 4);
        assert_eq!(mock.call_count(), 2);

        let retry = mock.last_request().unwrap();
        assert_eq!(retry.follow_ups.len(), 2);
        assert_eq!(retry.follow_ups[0].role, Role::Assistant);
        assert!(retry.follow_ups[1].content.contains("expected exactly 4 pages, got 3"));
    }

    #[tokio::test]
    async fn test_empty_answer_is_corrected_without_empty_turn() {
        let mock = Arc::new(MockBackend::new(vec![String::new(), outline_json(4)]));
        let ctx = ExecCtx::builder().build();

        let outline = outliner(&mock, 1).create_outline(&ctx, &image()).await.unwrap();
        assert_eq!(outline.pages.len(), 4);

        let retry = mock.last_request().unwrap();
        assert_eq!(retry.follow_ups.len(), 1);
        assert_eq!(retry.follow_ups[0].role, Role::User);
        assert!(retry.follow_ups.iter().all(|m| !m.content.trim().is_empty()));
    }

    #[tokio::test]
    async fn test_gives_up_after_corrections() {
        let mock = Arc::new(MockBackend::fixed("Once upon a time, with no JSON at all."));
        let ctx = ExecCtx::builder().build();

        let err = outliner(&mock, 2).create_outline(&ctx, &image()).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidOutline(_)));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_missing_title_is_rejected() {
        let mock = Arc::new(MockBackend::fixed(r#"{"pages": []}"#));
        let ctx = ExecCtx::builder().build();

        let err = outliner(&mock, 0).create_outline(&ctx, &image()).await.unwrap_err();
        match err {
            PipelineError::InvalidOutline(reason) => assert!(reason.contains("'title'")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_model_errors_are_not_corrected() {
        let mock = Arc::new(MockBackend::fixed(outline_json(4)).with_failure("model-a", 400));
        let ctx = ExecCtx::builder().build();

        let err = outliner(&mock, 3).create_outline(&ctx, &image()).await.unwrap_err();
        assert!(matches!(err, PipelineError::HttpError { status: 400, .. }));
        assert_eq!(mock.call_count(), 1);
    }
}
