//! Photo to picture book.
//!
//! [`StoryPipeline::generate_story`] runs the outliner, then requests every
//! page illustration concurrently and assembles the [`Story`]. An outline
//! failure aborts the story; an illustration failure only costs that page
//! its real image (the registry substitutes a placeholder).

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::exec_ctx::ExecCtx;
use crate::images::{ImageProviderRegistry, ImageResult};
use crate::outline::StoryOutliner;
use crate::types::{AspectRatio, GenerationRequest, ImageGenerationOptions, Story, StoryPage};
use crate::vision::VisionDescriber;

/// Prompt for one page illustration: style, character, scene, audience.
pub fn build_image_prompt(character_description: &str, scene: &str) -> String {
    format!(
        "Children's book illustration style, colorful and whimsical: {character_description} - {scene}. Friendly, magical atmosphere, soft lighting, suitable for ages 4-8."
    )
}

#[derive(Debug)]
pub struct StoryPipeline {
    outliner: StoryOutliner,
    images: Arc<ImageProviderRegistry>,
    aspect_ratio: AspectRatio,
    /// When set, the photo is sent along as a structure reference.
    reference_strength: Option<u8>,
}

impl StoryPipeline {
    pub fn new(outliner: StoryOutliner, images: Arc<ImageProviderRegistry>) -> Self {
        Self {
            outliner,
            images,
            aspect_ratio: AspectRatio::default(),
            reference_strength: None,
        }
    }

    /// Wire the default backends from `config`.
    pub fn from_config(config: &Config) -> Self {
        let describer = Arc::new(VisionDescriber::from_config(config));
        let outliner = StoryOutliner::new(describer, config.outline_retries);
        let images = Arc::new(ImageProviderRegistry::from_config(config));
        let pipeline = Self::new(outliner, images).with_aspect_ratio(config.aspect_ratio);
        match config.reference_strength {
            Some(strength) => pipeline.with_reference_strength(strength),
            None => pipeline,
        }
    }

    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    /// Use the captured photo as a structure reference for every page.
    pub fn with_reference_strength(mut self, strength: u8) -> Self {
        self.reference_strength = Some(strength.min(100));
        self
    }

    pub fn describer(&self) -> &Arc<VisionDescriber> {
        self.outliner.describer()
    }

    pub fn images(&self) -> &Arc<ImageProviderRegistry> {
        &self.images
    }

    pub async fn generate_story(&self, ctx: &ExecCtx, image: &GenerationRequest) -> Result<Story> {
        let started = Instant::now();
        let outline = self.outliner.create_outline(ctx, image).await?;
        ctx.check_cancelled()?;

        let requests: Vec<ImageGenerationOptions> = outline
            .pages
            .iter()
            .map(|page| {
                let options = ImageGenerationOptions::new(build_image_prompt(
                    &outline.character_description,
                    &page.image_prompt,
                ))
                .with_aspect_ratio(self.aspect_ratio);
                match self.reference_strength {
                    Some(strength) => options.with_reference(image.image_bytes.clone(), Some(strength)),
                    None => options,
                }
            })
            .collect();

        // Gathered positionally; completion order does not matter.
        let results: Vec<ImageResult> = join_all(
            requests
                .iter()
                .map(|options| self.images.generate_image(ctx, options)),
        )
        .await;

        let pages: Vec<StoryPage> = outline
            .pages
            .into_iter()
            .zip(results)
            .enumerate()
            .map(|(idx, (page, result))| StoryPage {
                id: idx as u32 + 1,
                text: page.text,
                image_url: result.url,
                audio_url: String::new(),
            })
            .collect();

        info!(
            title = %outline.title,
            pages = pages.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "story generated"
        );

        Ok(Story {
            id: Uuid::new_v4(),
            title: outline.title,
            pages,
            created_at: Utc::now(),
        })
    }
}
