//! Error types for structured-output extraction.

/// Errors returned by the extractor.
///
/// Callers are expected to degrade to presenting the raw text, which is why
/// [`ParseError::Unparseable`] keeps all of it rather than a snippet.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The model response was empty or whitespace-only.
    #[error("empty model response")]
    EmptyResponse,

    /// No strategy produced a well-formed JSON object.
    #[error("could not extract a JSON object from model output: {}", truncate(.text, 200))]
    Unparseable {
        /// The untouched model output, for diagnostic display.
        text: String,
    },

    /// A JSON object was found but does not match the target type.
    #[error("JSON deserialization failed: {reason}")]
    DeserializationFailed {
        /// The serde error message.
        reason: String,
        /// The extracted JSON that failed deserialization.
        raw_json: String,
    },
}

impl ParseError {
    /// Raw model text carried by the error, if any.
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            ParseError::Unparseable { text } => Some(text),
            ParseError::DeserializationFailed { raw_json, .. } => Some(raw_json),
            ParseError::EmptyResponse => None,
        }
    }
}

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
