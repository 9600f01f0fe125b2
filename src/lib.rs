//! # ClayQuest
//!
//! Turns a photo of a child's clay figurine into a four-page illustrated
//! story with narration.
//!
//! ## Core Concepts
//!
//! - **[`output_parser`]**: pulls one JSON object out of free-form model
//!   text (fence stripping, direct parse, string-aware brace scan, greedy
//!   match).
//! - **[`VisionDescriber`]**: image + prompt to a vision model, walking an
//!   ordered list of model ids past the ones that are not served.
//! - **[`StoryOutliner`]**: the four-page outline, validated and re-prompted
//!   when the shape is wrong.
//! - **[`ImageProviderRegistry`]**: primary, fallback and placeholder image
//!   providers, with generated images copied to a local cache.
//! - **[`NarrationCache`]**: content-addressed narration audio, degrading to
//!   client-side speech when synthesis is unavailable.
//! - **[`StoryPipeline`]**: outline, then every page illustration
//!   concurrently, then the assembled [`Story`].
//! - **[`ExecCtx`]**: HTTP client, transport backoff, cancellation flag and
//!   deadline, threaded through every network call.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clayquest::{Config, ExecCtx, GenerationRequest, StoryPipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
//!         ..Config::default()
//!     };
//!     let pipeline = StoryPipeline::from_config(&config);
//!     let ctx = config.exec_ctx();
//!
//!     let photo = GenerationRequest::new(std::fs::read("figurine.jpg")?, "image/jpeg");
//!     let story = pipeline.generate_story(&ctx, &photo).await?;
//!     for page in &story.pages {
//!         println!("{}: {} ({})", page.id, page.text, page.image_url);
//!     }
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod exec_ctx;
pub mod images;
pub mod narration;
pub mod outline;
pub mod output_parser;
pub mod pipeline;
pub mod retry;
pub mod server;
pub mod types;
pub mod vision;

pub use backend::{AnthropicBackend, BackoffConfig, MockBackend, VisionBackend};
pub use config::Config;
pub use error::{PipelineError, Result};
pub use exec_ctx::{ExecCtx, ExecCtxBuilder};
pub use images::{ImageProvider, ImageProviderRegistry, ImageResult, ProviderKind};
pub use narration::{NarrationCache, NarrationOutcome, SpeechBackend};
pub use outline::StoryOutliner;
pub use pipeline::StoryPipeline;
pub use retry::RetryConfig;
pub use server::{build_router, AppState};
pub use types::{
    AspectRatio, CachedAsset, CharacterProfile, GenerationRequest, ImageGenerationOptions,
    OutlinePage, Story, StoryOutline, StoryPage,
};
pub use vision::{CharacterDescription, Description, VisionDescriber};
