//! clayquest server binary.
//!
//! Reads settings from the environment (a `.env` file is honored), prepares
//! the cache directories and serves the story API.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use clayquest::config::{
    credential, parse_provider, provider_or, Config, DEFAULT_GEMINI_MODEL, DEFAULT_VOICE_ID,
};
use clayquest::images::ProviderKind;
use clayquest::{build_router, AppState, AspectRatio, BackoffConfig};

#[derive(Debug, Parser)]
#[command(name = "clayquest", version, about = "Clay figurine story generation server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "CLAYQUEST_BIND", default_value = "0.0.0.0:3000")]
    bind: String,

    /// Root of the image and audio caches.
    #[arg(long, env = "CLAYQUEST_TEMP_DIR", default_value = "temp")]
    temp_dir: PathBuf,

    /// Primary image provider: freepik, gemini or placeholder.
    #[arg(long, env = "IMAGE_PROVIDER")]
    image_provider: Option<String>,

    /// Provider tried once when the primary fails.
    #[arg(long, env = "IMAGE_PROVIDER_FALLBACK")]
    image_provider_fallback: Option<String>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    #[arg(long, env = "FREEPIK_API_KEY", hide_env_values = true)]
    freepik_api_key: Option<String>,

    #[arg(long, env = "ELEVENLABS_API_KEY", hide_env_values = true)]
    elevenlabs_api_key: Option<String>,

    #[arg(long, env = "ELEVENLABS_VOICE_ID")]
    elevenlabs_voice_id: Option<String>,

    /// Imagen model for the gemini provider.
    #[arg(long, env = "GEMINI_IMAGE_MODEL")]
    gemini_model: Option<String>,

    /// Illustration shape: 4:3, 16:9, 1:1 or 3:4.
    #[arg(long, env = "IMAGE_ASPECT_RATIO", default_value = "4:3")]
    aspect_ratio: AspectRatio,

    /// Send the photo as a structure reference with this strength (0-100).
    #[arg(long, env = "IMAGE_REFERENCE_STRENGTH", value_parser = clap::value_parser!(u8).range(0..=100))]
    reference_strength: Option<u8>,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            image_provider: provider_or(self.image_provider.as_deref(), ProviderKind::Freepik),
            image_provider_fallback: parse_provider(self.image_provider_fallback.as_deref()),
            anthropic_api_key: credential(self.anthropic_api_key.as_deref()),
            gemini_api_key: credential(self.gemini_api_key.as_deref()),
            freepik_api_key: credential(self.freepik_api_key.as_deref()),
            elevenlabs_api_key: credential(self.elevenlabs_api_key.as_deref()),
            elevenlabs_voice_id: credential(self.elevenlabs_voice_id.as_deref())
                .unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            gemini_model: self
                .gemini_model
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            aspect_ratio: self.aspect_ratio,
            reference_strength: self.reference_strength,
            temp_dir: self.temp_dir,
            backoff: BackoffConfig::interactive(),
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting clayquest v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let bind = args.bind.clone();
    let config = args.into_config();
    info!(?config, "configuration loaded");

    for dir in [config.images_dir(), config.audio_dir()] {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating cache directory {}", dir.display()))?;
    }

    let app = build_router(AppState::from_config(&config));

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!("clayquest listening on http://{bind}");
    info!("Health check: http://{bind}/health");

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
