//! Execution context shared across one generation request.
//!
//! [`ExecCtx`] carries the HTTP client, transport backoff policy, cancellation
//! flag and optional deadline. Every component that talks to the network takes
//! it by reference so an abandoned request stops its model calls and polling
//! loops at the next checkpoint.

use crate::backend::BackoffConfig;
use crate::error::{PipelineError, Result};
use reqwest::Client;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

/// Shared execution context for pipeline calls.
///
/// Cloning is cheap; clones share the client and the cancellation flag.
///
/// # Example
///
/// ```
/// use clayquest::ExecCtx;
/// use std::time::Duration;
///
/// let ctx = ExecCtx::builder()
///     .timeout(Duration::from_secs(30))
///     .deadline_in(Duration::from_secs(300))
///     .build();
/// assert!(!ctx.is_cancelled());
/// ```
#[derive(Clone)]
pub struct ExecCtx {
    /// HTTP client (cheap to clone -- uses `Arc` internally).
    pub client: Client,
    /// Transport retry configuration for model calls. Default: [`BackoffConfig::none()`].
    pub backoff: BackoffConfig,
    /// Optional cancellation flag; long-running steps check it between calls.
    pub cancellation: Option<Arc<AtomicBool>>,
    /// Optional wall-clock deadline for the whole request.
    pub deadline: Option<Instant>,
}

impl ExecCtx {
    /// Create a new builder.
    pub fn builder() -> ExecCtxBuilder {
        ExecCtxBuilder {
            client: None,
            backoff: None,
            cancellation: None,
            deadline: None,
            timeout: None,
        }
    }

    /// Copy of this context with its own cancellation flag, sharing the client.
    pub fn with_cancellation(&self, flag: Arc<AtomicBool>) -> Self {
        Self {
            cancellation: Some(flag),
            ..self.clone()
        }
    }

    /// Check whether cancellation has been requested or the deadline passed.
    pub fn is_cancelled(&self) -> bool {
        let flagged = self
            .cancellation
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed));
        let expired = self.deadline.is_some_and(|d| Instant::now() >= d);
        flagged || expired
    }

    /// Return an error if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    /// Sleep for `duration`, then re-check cancellation.
    ///
    /// Never sleeps past the deadline.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        let duration = match self.deadline {
            Some(d) => duration.min(d.saturating_duration_since(Instant::now())),
            None => duration,
        };
        tokio::time::sleep(duration).await;
        self.check_cancelled()
    }
}

impl std::fmt::Debug for ExecCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecCtx")
            .field("backoff", &self.backoff)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("deadline", &self.deadline)
            .finish()
    }
}

/// Builder for [`ExecCtx`].
pub struct ExecCtxBuilder {
    client: Option<Client>,
    backoff: Option<BackoffConfig>,
    cancellation: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl ExecCtxBuilder {
    /// Set the HTTP client. If not set, a default client is created.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the transport retry configuration. Default: [`BackoffConfig::none()`].
    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = Some(config);
        self
    }

    /// Set the cancellation flag.
    pub fn cancellation(mut self, cancel: Option<Arc<AtomicBool>>) -> Self {
        self.cancellation = cancel;
        self
    }

    /// Cancel everything still running `after` from now.
    pub fn deadline_in(mut self, after: Duration) -> Self {
        self.deadline = Some(Instant::now() + after);
        self
    }

    /// Set the per-call request timeout. Default: 30 seconds.
    ///
    /// Ignored when a custom `Client` is provided via `.client()`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the execution context.
    pub fn build(self) -> ExecCtx {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(30));
        let client = self.client.unwrap_or_else(|| {
            Client::builder()
                .timeout(timeout)
                .build()
                .expect("Failed to build HTTP client")
        });
        ExecCtx {
            client,
            backoff: self.backoff.unwrap_or_else(BackoffConfig::none),
            cancellation: self.cancellation,
            deadline: self.deadline,
        }
    }
}
