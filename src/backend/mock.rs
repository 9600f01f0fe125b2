//! Mock backend for testing without a live model.
//!
//! [`MockBackend`] returns pre-configured responses in order and can be told
//! to report certain models as unavailable or to fail transiently, so the
//! candidate-fallback and backoff paths can be exercised deterministically.
//!
//! # Example
//!
//! ```
//! use clayquest::backend::MockBackend;
//!
//! let mock = MockBackend::new(vec!["{\"title\": \"x\"}".to_string()])
//!     .with_unavailable(&["old-model"]);
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;

use super::{ContentBlock, VisionBackend, VisionRequest, VisionResponse};
use crate::error::Result;
use crate::PipelineError;

/// A test backend that returns canned responses in order.
///
/// Cycles back to the beginning when all responses have been consumed.
#[derive(Debug)]
pub struct MockBackend {
    responses: Vec<String>,
    index: AtomicUsize,
    unavailable: HashSet<String>,
    failing: Option<(String, u16)>,
    transient_left: AtomicU32,
    transient_status: u16,
    calls: Mutex<Vec<VisionRequest>>,
}

impl MockBackend {
    /// Create a mock backend with the given canned responses.
    pub fn new(responses: Vec<String>) -> Self {
        assert!(!responses.is_empty(), "MockBackend requires at least one response");
        Self {
            responses,
            index: AtomicUsize::new(0),
            unavailable: HashSet::new(),
            failing: None,
            transient_left: AtomicU32::new(0),
            transient_status: 503,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Report these model ids as [`PipelineError::ModelUnavailable`].
    pub fn with_unavailable(mut self, models: &[&str]) -> Self {
        self.unavailable = models.iter().map(|m| m.to_string()).collect();
        self
    }

    /// Fail calls to `model` with a non-retryable HTTP status.
    pub fn with_failure(mut self, model: &str, status: u16) -> Self {
        self.failing = Some((model.to_string(), status));
        self
    }

    /// Fail the first `count` calls with a transient HTTP status.
    pub fn with_transient_failures(mut self, count: u32, status: u16) -> Self {
        self.transient_left = AtomicU32::new(count);
        self.transient_status = status;
        self
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Model ids in the order they were called.
    pub fn models_called(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|c| c.iter().map(|r| r.model.clone()).collect())
            .unwrap_or_default()
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<VisionRequest> {
        self.calls.lock().ok().and_then(|c| c.last().cloned())
    }

    fn next_response(&self) -> String {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.responses.len();
        self.responses[idx].clone()
    }
}

#[async_trait]
impl VisionBackend for MockBackend {
    async fn complete(&self, _client: &Client, request: &VisionRequest) -> Result<VisionResponse> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }

        if self.unavailable.contains(&request.model) {
            return Err(PipelineError::ModelUnavailable {
                model: request.model.clone(),
                message: "not_found_error".into(),
            });
        }

        if let Some((model, status)) = &self.failing {
            if model == &request.model {
                return Err(PipelineError::HttpError {
                    status: *status,
                    body: "mock failure".into(),
                    retry_after: None,
                });
            }
        }

        let transient = self
            .transient_left
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(PipelineError::HttpError {
                status: self.transient_status,
                body: "mock overload".into(),
                retry_after: None,
            });
        }

        Ok(VisionResponse {
            content: vec![ContentBlock::Text(self.next_response())],
            status: 200,
            model: request.model.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
