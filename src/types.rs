use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// A captured photo submitted for analysis.
#[derive(Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Raw image bytes.
    pub image_bytes: Vec<u8>,

    /// Media type, e.g. `image/jpeg`.
    pub mime_type: String,
}

impl GenerationRequest {
    pub fn new(image_bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            image_bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Decode a `data:image/<type>;base64,` URL or bare base64.
    ///
    /// Bare base64 is assumed to be JPEG, which is what camera captures produce.
    pub fn from_base64(input: &str) -> Result<Self> {
        let (mime_type, payload) = split_data_url(input.trim());
        if payload.is_empty() {
            return Err(PipelineError::InvalidImage("empty image data".into()));
        }
        let image_bytes = STANDARD
            .decode(payload)
            .map_err(|e| PipelineError::InvalidImage(e.to_string()))?;
        Ok(Self {
            image_bytes,
            mime_type: mime_type.unwrap_or("image/jpeg").to_string(),
        })
    }

    /// Image bytes re-encoded as standard base64 (no data-URL prefix).
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.image_bytes)
    }
}

impl std::fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("image_bytes", &self.image_bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

/// Split `data:<mime>;base64,<payload>` into its parts.
///
/// Anything that does not look like a data URL is returned whole as payload.
pub(crate) fn split_data_url(input: &str) -> (Option<&str>, &str) {
    if let Some(rest) = input.strip_prefix("data:") {
        if let Some((header, payload)) = rest.split_once(',') {
            let mime = header.strip_suffix(";base64").unwrap_or(header);
            let mime = if mime.is_empty() { None } else { Some(mime) };
            return (mime, payload);
        }
    }
    (None, input)
}

/// Short structured description of a figurine.
///
/// Every field is required; a model answer missing one is rejected whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterProfile {
    pub name: String,
    pub color: String,
    pub shape: String,
    pub character_traits: Vec<String>,
    pub tone: String,
}

/// One page of the outline, before any illustration exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlinePage {
    pub text: String,
    pub image_prompt: String,
}

/// Title plus per-page text and scene prompt, as written by the vision model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryOutline {
    pub title: String,

    /// Appearance of the figurine, reused in every illustration prompt.
    pub character_description: String,

    pub pages: Vec<OutlinePage>,
}

/// A finished page of the picture book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryPage {
    /// 1-based, matches the page's position.
    pub id: u32,
    pub text: String,
    pub image_url: String,

    /// Empty until the page is narrated.
    pub audio_url: String,
}

/// The assembled picture book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: Uuid,
    pub title: String,
    pub pages: Vec<StoryPage>,
    pub created_at: DateTime<Utc>,
}

/// Supported illustration aspect ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "4:3")]
    Classic,
    #[serde(rename = "16:9")]
    Widescreen,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Classic => "4:3",
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
        }
    }

    pub const ALL: [AspectRatio; 4] = [
        AspectRatio::Classic,
        AspectRatio::Widescreen,
        AspectRatio::Square,
        AspectRatio::Portrait,
    ];

    /// Pixel size used for placeholder images.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            AspectRatio::Classic => (800, 600),
            AspectRatio::Widescreen => (960, 540),
            AspectRatio::Square => (600, 600),
            AspectRatio::Portrait => (600, 800),
        }
    }
}

impl std::str::FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        AspectRatio::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == s)
            .ok_or_else(|| format!("unknown aspect ratio '{s}'"))
    }
}

/// Input to an image provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageGenerationOptions {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,

    /// Reference image for structure transfer.
    pub reference_image: Option<Vec<u8>>,

    /// How closely to follow the reference (0-100).
    pub reference_strength: Option<u8>,
}

impl ImageGenerationOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio: AspectRatio::default(),
            reference_image: None,
            reference_strength: None,
        }
    }

    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Attach a reference image; strength is clamped to 0-100.
    pub fn with_reference(mut self, image: Vec<u8>, strength: Option<u8>) -> Self {
        self.reference_image = Some(image);
        self.reference_strength = strength.map(|s| s.min(100));
        self
    }
}

impl std::fmt::Debug for ImageGenerationOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageGenerationOptions")
            .field("prompt", &self.prompt)
            .field("aspect_ratio", &self.aspect_ratio)
            .field("reference_image", &self.reference_image.as_ref().map(Vec::len))
            .field("reference_strength", &self.reference_strength)
            .finish()
    }
}

/// A file persisted in one of the local caches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAsset {
    /// Cache key the filename was derived from.
    pub key: String,

    /// Where the bytes live on disk.
    pub local_path: PathBuf,

    /// Public URL path the file is served under.
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_data_url() {
        let req = GenerationRequest::from_base64("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(req.image_bytes, b"hello");
        assert_eq!(req.mime_type, "image/png");
    }

    #[test]
    fn test_from_raw_base64_defaults_to_jpeg() {
        let req = GenerationRequest::from_base64("aGVsbG8=").unwrap();
        assert_eq!(req.image_bytes, b"hello");
        assert_eq!(req.mime_type, "image/jpeg");
        assert_eq!(req.to_base64(), "aGVsbG8=");
    }

    #[test]
    fn test_from_base64_rejects_garbage() {
        assert!(GenerationRequest::from_base64("not base64 !!").is_err());
        assert!(GenerationRequest::from_base64("").is_err());
        assert!(GenerationRequest::from_base64("data:image/png;base64,").is_err());
    }

    #[test]
    fn test_character_profile_requires_all_fields() {
        let partial = serde_json::json!({
            "name": "Blobby",
            "color": "blue",
            "shape": "round",
            "tone": "cheerful"
        });
        assert!(serde_json::from_value::<CharacterProfile>(partial).is_err());

        let full = serde_json::json!({
            "name": "Blobby",
            "color": "blue",
            "shape": "round",
            "characterTraits": ["brave", "curious"],
            "tone": "cheerful"
        });
        let profile: CharacterProfile = serde_json::from_value(full).unwrap();
        assert_eq!(profile.character_traits, vec!["brave", "curious"]);
    }

    #[test]
    fn test_story_serializes_camel_case() {
        let story = Story {
            id: Uuid::new_v4(),
            title: "T".into(),
            pages: vec![StoryPage {
                id: 1,
                text: "x".into(),
                image_url: "/temp/images/a.png".into(),
                audio_url: String::new(),
            }],
            created_at: Utc::now(),
        };
        let val = serde_json::to_value(&story).unwrap();
        assert!(val.get("createdAt").is_some());
        assert_eq!(val["pages"][0]["imageUrl"], "/temp/images/a.png");
        assert_eq!(val["pages"][0]["audioUrl"], "");
    }

    #[test]
    fn test_aspect_ratio_serde_and_dimensions() {
        let ratio: AspectRatio = serde_json::from_str("\"16:9\"").unwrap();
        assert_eq!(ratio, AspectRatio::Widescreen);
        assert_eq!(ratio.dimensions(), (960, 540));
        assert_eq!(AspectRatio::default().as_str(), "4:3");
    }

    #[test]
    fn test_aspect_ratio_from_str() {
        assert_eq!("3:4".parse::<AspectRatio>(), Ok(AspectRatio::Portrait));
        assert_eq!(" 1:1 ".parse::<AspectRatio>(), Ok(AspectRatio::Square));
        assert!("2:1".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_reference_strength_clamped() {
        let opts = ImageGenerationOptions::new("p").with_reference(vec![1], Some(150));
        assert_eq!(opts.reference_strength, Some(100));
    }
}
