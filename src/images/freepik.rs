//! Freepik Mystic: submit a generation task, then poll it.
//!
//! The create call returns a task id; the status endpoint is polled every
//! `poll_interval` until `COMPLETED` or `FAILED`, up to `max_attempts` polls.
//! Running out of attempts is a [`PipelineError::TaskTimeout`].

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{GeneratedImage, ImageProvider, ImageReference, ProviderKind};
use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::types::{AspectRatio, ImageGenerationOptions};

const DEFAULT_BASE_URL: &str = "https://api.freepik.com";
const TASK_PATH: &str = "/v1/ai/mystic";
const DEFAULT_REFERENCE_STRENGTH: u8 = 70;

#[derive(Debug, Deserialize)]
struct TaskEnvelope {
    data: TaskData,
}

#[derive(Debug, Deserialize)]
struct TaskData {
    task_id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    generated: Vec<String>,
}

/// Where a polled task stands.
#[derive(Debug, PartialEq, Eq)]
enum TaskState {
    Completed(Option<String>),
    Failed,
    Pending,
}

impl TaskData {
    fn state(&self) -> TaskState {
        match self.status.as_str() {
            "COMPLETED" => TaskState::Completed(self.generated.first().cloned()),
            "FAILED" => TaskState::Failed,
            _ => TaskState::Pending,
        }
    }
}

#[derive(Clone)]
pub struct FreepikProvider {
    api_key: Option<String>,
    base_url: String,
    poll_interval: Duration,
    max_attempts: u32,
}

impl std::fmt::Debug for FreepikProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreepikProvider")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("base_url", &self.base_url)
            .field("poll_interval", &self.poll_interval)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl FreepikProvider {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            poll_interval: Duration::from_secs(2),
            max_attempts: 60,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Poll cadence; `max_attempts * interval` bounds the wait.
    pub fn with_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.poll_interval = interval;
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn aspect_ratio_name(ratio: AspectRatio) -> &'static str {
        match ratio {
            AspectRatio::Classic => "classic_4_3",
            AspectRatio::Widescreen => "widescreen_16_9",
            AspectRatio::Square => "square_1_1",
            AspectRatio::Portrait => "traditional_3_4",
        }
    }

    fn build_body(options: &ImageGenerationOptions) -> Value {
        let mut body = json!({
            "prompt": options.prompt,
            "resolution": "2k",
            "aspect_ratio": Self::aspect_ratio_name(options.aspect_ratio),
            "model": "flexible",
            "filter_nsfw": true,
        });
        if let Some(ref reference) = options.reference_image {
            body["structure"] = json!({
                "image_base64": STANDARD.encode(reference),
                "strength": options.reference_strength.unwrap_or(DEFAULT_REFERENCE_STRENGTH),
            });
        }
        body
    }

    async fn read_task(resp: reqwest::Response) -> Result<TaskData> {
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::HttpError {
                status,
                body,
                retry_after: None,
            });
        }
        let envelope: TaskEnvelope = resp.json().await?;
        Ok(envelope.data)
    }

    async fn create_task(
        &self,
        ctx: &ExecCtx,
        api_key: &str,
        options: &ImageGenerationOptions,
    ) -> Result<String> {
        let url = format!("{}{}", self.base_url, TASK_PATH);
        let resp = ctx
            .client
            .post(&url)
            .header("x-freepik-api-key", api_key)
            .json(&Self::build_body(options))
            .send()
            .await?;
        Ok(Self::read_task(resp).await?.task_id)
    }

    async fn wait_for_completion(
        &self,
        ctx: &ExecCtx,
        api_key: &str,
        task_id: &str,
    ) -> Result<String> {
        let url = format!("{}{}/{}", self.base_url, TASK_PATH, task_id);

        for attempt in 1..=self.max_attempts {
            ctx.check_cancelled()?;
            let resp = ctx
                .client
                .get(&url)
                .header("x-freepik-api-key", api_key)
                .send()
                .await?;
            let task = Self::read_task(resp).await?;

            match task.state() {
                TaskState::Completed(Some(image_url)) => return Ok(image_url),
                TaskState::Completed(None) => return Err(PipelineError::EmptyResult("freepik")),
                TaskState::Failed => {
                    return Err(PipelineError::TaskFailed {
                        provider: "freepik",
                        task_id: task_id.to_string(),
                    })
                }
                TaskState::Pending => {
                    debug!(task_id, attempt, status = %task.status, "freepik task pending");
                }
            }

            if attempt < self.max_attempts {
                ctx.sleep(self.poll_interval).await?;
            }
        }

        Err(PipelineError::TaskTimeout {
            provider: "freepik",
            task_id: task_id.to_string(),
            attempts: self.max_attempts,
        })
    }
}

#[async_trait]
impl ImageProvider for FreepikProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Freepik
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(
        &self,
        ctx: &ExecCtx,
        options: &ImageGenerationOptions,
    ) -> Result<GeneratedImage> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(PipelineError::ProviderUnavailable("freepik"))?;
        ctx.check_cancelled()?;

        let started = Instant::now();
        let task_id = self.create_task(ctx, api_key, options).await?;
        debug!(task_id = %task_id, "freepik task created");
        let image_url = self.wait_for_completion(ctx, api_key, &task_id).await?;

        Ok(GeneratedImage {
            reference: ImageReference::Url(image_url),
            provider: ProviderKind::Freepik,
            duration: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Stub task API: the task reports `pending_polls` IN_PROGRESS answers,
    /// then `final_status`.
    #[derive(Clone)]
    struct Stub {
        polls: Arc<AtomicU32>,
        pending_polls: u32,
        final_status: &'static str,
        generated: Vec<String>,
    }

    async fn create(Json(body): Json<Value>) -> Json<Value> {
        assert_eq!(body["model"], "flexible");
        Json(json!({"data": {"task_id": "task-1", "status": "CREATED", "generated": []}}))
    }

    async fn status(State(stub): State<Stub>, Path(id): Path<String>) -> Json<Value> {
        assert_eq!(id, "task-1");
        let n = stub.polls.fetch_add(1, Ordering::SeqCst);
        if n < stub.pending_polls {
            return Json(json!({"data": {"task_id": id, "status": "IN_PROGRESS", "generated": []}}));
        }
        Json(json!({"data": {"task_id": id, "status": stub.final_status, "generated": stub.generated}}))
    }

    async fn spawn_stub(stub: Stub) -> String {
        let app = Router::new()
            .route("/v1/ai/mystic", post(create))
            .route("/v1/ai/mystic/:id", get(status))
            .with_state(stub);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn provider(base: &str, attempts: u32) -> FreepikProvider {
        FreepikProvider::new(Some("key".into()))
            .with_base_url(base)
            .with_polling(Duration::from_millis(5), attempts)
    }

    #[test]
    fn test_build_body_with_reference() {
        let opts = ImageGenerationOptions::new("scene").with_reference(b"hello".to_vec(), None);
        let body = FreepikProvider::build_body(&opts);
        assert_eq!(body["aspect_ratio"], "classic_4_3");
        assert_eq!(body["structure"]["image_base64"], "aGVsbG8=");
        assert_eq!(body["structure"]["strength"], 70);

        let plain = FreepikProvider::build_body(&ImageGenerationOptions::new("scene"));
        assert!(plain.get("structure").is_none());
    }

    #[test]
    fn test_task_state() {
        let task = TaskData {
            task_id: "t".into(),
            status: "COMPLETED".into(),
            generated: vec!["a".into(), "b".into()],
        };
        assert_eq!(task.state(), TaskState::Completed(Some("a".into())));
        let task = TaskData {
            status: "CREATED".into(),
            generated: vec![],
            ..task
        };
        assert_eq!(task.state(), TaskState::Pending);
    }

    #[tokio::test]
    async fn test_polls_until_completed_and_takes_first() {
        let polls = Arc::new(AtomicU32::new(0));
        let base = spawn_stub(Stub {
            polls: polls.clone(),
            pending_polls: 2,
            final_status: "COMPLETED",
            generated: vec!["https://cdn/one.png".into(), "https://cdn/two.png".into()],
        })
        .await;

        let ctx = ExecCtx::builder().build();
        let img = provider(&base, 10)
            .generate(&ctx, &ImageGenerationOptions::new("x"))
            .await
            .unwrap();
        assert_eq!(img.reference, ImageReference::Url("https://cdn/one.png".into()));
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_task_is_an_error() {
        let base = spawn_stub(Stub {
            polls: Arc::new(AtomicU32::new(0)),
            pending_polls: 0,
            final_status: "FAILED",
            generated: vec![],
        })
        .await;

        let ctx = ExecCtx::builder().build();
        let err = provider(&base, 10)
            .generate(&ctx, &ImageGenerationOptions::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TaskFailed { .. }));
    }

    #[tokio::test]
    async fn test_never_terminal_times_out() {
        let polls = Arc::new(AtomicU32::new(0));
        let base = spawn_stub(Stub {
            polls: polls.clone(),
            pending_polls: u32::MAX,
            final_status: "COMPLETED",
            generated: vec![],
        })
        .await;

        let ctx = ExecCtx::builder().build();
        let err = provider(&base, 3)
            .generate(&ctx, &ImageGenerationOptions::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::TaskTimeout { attempts: 3, .. }));
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_completed_without_images_is_empty_result() {
        let base = spawn_stub(Stub {
            polls: Arc::new(AtomicU32::new(0)),
            pending_polls: 0,
            final_status: "COMPLETED",
            generated: vec![],
        })
        .await;

        let ctx = ExecCtx::builder().build();
        let err = provider(&base, 3)
            .generate(&ctx, &ImageGenerationOptions::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyResult("freepik")));
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_before_network() {
        let ctx = ExecCtx::builder()
            .cancellation(Some(Arc::new(std::sync::atomic::AtomicBool::new(true))))
            .build();
        let err = provider("http://127.0.0.1:9", 3)
            .generate(&ctx, &ImageGenerationOptions::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }
}
