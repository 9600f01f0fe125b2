//! HTTP surface.
//!
//! | Route | Handler |
//! |-------|---------|
//! | `POST /api/generate` | photo to [`Story`](crate::types::Story) |
//! | `POST /api/tts` | page narration, or a signal to narrate locally |
//! | `POST /api/analyze-image` | photo to character description |
//! | `GET /api/providers` | image provider availability |
//! | `GET /health` | liveness |
//! | `GET /temp/images/:filename`, `GET /temp/audio/:filename` | cached assets |

pub mod assets;
pub mod handlers;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::exec_ctx::ExecCtx;
use crate::narration::{ElevenLabsBackend, NarrationCache};
use crate::pipeline::StoryPipeline;

/// Captured photos arrive base64-encoded in the JSON body.
const BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<StoryPipeline>,
    pub narration: Arc<NarrationCache>,
    /// Template for per-request contexts; shares the HTTP client.
    pub exec: ExecCtx,
    pub images_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub request_deadline: Duration,
}

impl AppState {
    pub fn new(
        pipeline: Arc<StoryPipeline>,
        narration: Arc<NarrationCache>,
        exec: ExecCtx,
        images_dir: PathBuf,
        audio_dir: PathBuf,
    ) -> Self {
        Self {
            pipeline,
            narration,
            exec,
            images_dir,
            audio_dir,
            request_deadline: Duration::from_secs(300),
        }
    }

    /// Wire every component from `config`.
    pub fn from_config(config: &Config) -> Self {
        let pipeline = StoryPipeline::from_config(config);
        let speech = ElevenLabsBackend::new(config.elevenlabs_api_key.clone())
            .with_voice(config.elevenlabs_voice_id.clone());
        let narration = NarrationCache::new(
            Arc::new(speech),
            config.audio_dir(),
            config.audio_url_prefix.clone(),
        );
        let mut state = Self::new(
            Arc::new(pipeline),
            Arc::new(narration),
            config.exec_ctx(),
            config.images_dir(),
            config.audio_dir(),
        );
        state.request_deadline = config.request_deadline;
        state
    }

    /// A context for one request, cancelled when the guard is dropped.
    ///
    /// Axum drops the handler future when the client goes away, which drops
    /// the guard and stops any polling still in flight.
    pub fn request_ctx(&self) -> (ExecCtx, CancelOnDrop) {
        let flag = Arc::new(AtomicBool::new(false));
        let mut ctx = self.exec.with_cancellation(flag.clone());
        ctx.deadline = Some(Instant::now() + self.request_deadline);
        (ctx, CancelOnDrop(flag))
    }
}

/// Sets the cancellation flag when dropped.
#[derive(Debug)]
pub struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(handlers::generate_story))
        .route("/api/tts", post(handlers::narrate))
        .route("/api/analyze-image", post(handlers::analyze_image))
        .route("/api/providers", get(handlers::providers))
        .route("/health", get(handlers::health))
        .route("/temp/images/:filename", get(assets::serve_image))
        .route("/temp/audio/:filename", get(assets::serve_audio))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
