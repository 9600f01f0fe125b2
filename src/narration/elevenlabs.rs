//! ElevenLabs text-to-speech.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::SpeechBackend;
use crate::config::DEFAULT_VOICE_ID;
use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_MODEL: &str = "eleven_multilingual_v2";

#[derive(Clone)]
pub struct ElevenLabsBackend {
    api_key: Option<String>,
    voice_id: String,
    model_id: String,
    base_url: String,
}

impl std::fmt::Debug for ElevenLabsBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElevenLabsBackend")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("voice_id", &self.voice_id)
            .field("model_id", &self.model_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ElevenLabsBackend {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Settings tuned for a warm storytelling read.
    fn build_body(&self, text: &str) -> Value {
        json!({
            "text": text,
            "model_id": self.model_id,
            "voice_settings": {
                "stability": 0.5,
                "similarity_boost": 0.75,
                "style": 0.5,
                "use_speaker_boost": true,
            }
        })
    }
}

#[async_trait]
impl SpeechBackend for ElevenLabsBackend {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn synthesize(&self, ctx: &ExecCtx, text: &str) -> Result<Vec<u8>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| PipelineError::InvalidConfig("ELEVENLABS_API_KEY is not set".into()))?;
        ctx.check_cancelled()?;

        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id);
        let resp = ctx
            .client
            .post(&url)
            .header("xi-api-key", api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&self.build_body(text))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::HttpError {
                status,
                body,
                retry_after: None,
            });
        }

        let audio = resp.bytes().await?.to_vec();
        debug!(voice = %self.voice_id, size = audio.len(), "speech synthesized");
        Ok(audio)
    }

    fn name(&self) -> &'static str {
        "elevenlabs"
    }
}
