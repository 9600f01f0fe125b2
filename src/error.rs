use std::time::Duration;
use thiserror::Error;

use crate::output_parser::ParseError;

/// Errors produced by the generation pipeline and its components.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Low-level HTTP transport failure (connection refused, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem failure while reading or writing a cached asset.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by backends and providers when the upstream service answers
    /// with a non-success status that is not otherwise classified.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// The requested model id does not exist or is not served to this key.
    ///
    /// The only error class that lets the describer move on to the next
    /// model candidate.
    #[error("model '{model}' unavailable: {message}")]
    ModelUnavailable { model: String, message: String },

    /// Every model candidate reported [`PipelineError::ModelUnavailable`].
    #[error("no model candidate available (last error: {last})")]
    AllModelsUnavailable { last: Box<PipelineError> },

    /// The model answered without any text content block.
    #[error("no text response from model")]
    NoTextContent,

    /// Structured output could not be extracted from the model text.
    #[error(transparent)]
    Extraction(#[from] ParseError),

    /// The story outline did not have the expected shape.
    #[error("invalid story outline: {0}")]
    InvalidOutline(String),

    /// The character description did not carry every required field.
    #[error("invalid character profile: {0}")]
    InvalidProfile(String),

    /// An image provider was asked to generate without its credential.
    #[error("image provider '{0}' is not configured")]
    ProviderUnavailable(&'static str),

    /// A polling-task provider reported a terminal failure.
    #[error("{provider}: generation task {task_id} failed")]
    TaskFailed {
        provider: &'static str,
        task_id: String,
    },

    /// A polling-task provider never reached a terminal state.
    #[error("{provider}: timed out waiting for task {task_id} after {attempts} polls")]
    TaskTimeout {
        provider: &'static str,
        task_id: String,
        attempts: u32,
    },

    /// A provider reported success but returned no image.
    #[error("{0}: no image in response")]
    EmptyResult(&'static str),

    /// The submitted image payload could not be decoded.
    #[error("invalid image payload: {0}")]
    InvalidImage(String),

    /// The request was cancelled or its deadline passed.
    #[error("Pipeline was cancelled")]
    Cancelled,

    /// Invalid configuration detected at construction time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Whether this error means "try the next model candidate".
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, PipelineError::ModelUnavailable { .. })
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_unavailable_classification() {
        let err = PipelineError::ModelUnavailable {
            model: "m".into(),
            message: "not_found_error".into(),
        };
        assert!(err.is_model_unavailable());

        let err = PipelineError::HttpError {
            status: 404,
            body: "not_found".into(),
            retry_after: None,
        };
        assert!(!err.is_model_unavailable());
    }

    #[test]
    fn test_aggregate_error_names_last_cause() {
        let err = PipelineError::AllModelsUnavailable {
            last: Box::new(PipelineError::ModelUnavailable {
                model: "claude-x".into(),
                message: "gone".into(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("claude-x"));
        assert!(msg.contains("gone"));
    }
}
