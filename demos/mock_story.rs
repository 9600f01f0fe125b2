//! Example: a whole story from a canned outline, with no live services.
//!
//! Run with: `cargo run --example mock_story`

use clayquest::images::{ImageStore, PlaceholderProvider};
use clayquest::{
    ExecCtx, GenerationRequest, ImageProviderRegistry, MockBackend, StoryOutliner, StoryPipeline,
    VisionBackend, VisionDescriber,
};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The mock answers every vision call with the same outline
    let outline = json!({
        "title": "Pip and the Puddle Kingdom",
        "characterDescription": "a small blue clay bird with a round belly",
        "pages": [
            {"text": "Pip woke up to the sound of rain.", "imagePrompt": "waking in a nest"},
            {"text": "Outside, the puddles had become a kingdom.", "imagePrompt": "tiny puddle castles"},
            {"text": "The frog queen asked Pip for help.", "imagePrompt": "meeting a frog queen"},
            {"text": "Together they built a bridge of leaves.", "imagePrompt": "a leaf bridge at sunset"}
        ]
    });
    let backend: Arc<dyn VisionBackend> =
        Arc::new(MockBackend::fixed(format!("```json\n{outline}\n```")));

    let describer = Arc::new(VisionDescriber::new(backend, vec!["mock-model".into()]));
    let images = ImageProviderRegistry::new(
        Arc::new(PlaceholderProvider::new()),
        None,
        ImageStore::new(std::env::temp_dir().join("clayquest-demo"), "/temp/images"),
    );
    let pipeline = StoryPipeline::new(StoryOutliner::new(describer, 1), Arc::new(images));

    let ctx = ExecCtx::builder().build();
    let photo = GenerationRequest::new(b"not really a photo".to_vec(), "image/jpeg");
    let story = pipeline.generate_story(&ctx, &photo).await?;

    println!("{}", story.title);
    for page in &story.pages {
        println!("  {}. {}", page.id, page.text);
        println!("     {}", page.image_url);
    }

    Ok(())
}
