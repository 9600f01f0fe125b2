//! Corrective re-prompting when a model answer fails validation.
//!
//! [`RetryConfig`] decides whether an answer needs another round (it did
//! not parse, or the validator rejected it) and builds the follow-up turns:
//! the bad answer as the assistant turn, then a user turn naming the problem.

use std::sync::Arc;

use crate::backend::ChatMessage;
use crate::output_parser::{JsonObject, ParseError};

/// Semantic validator run on a successfully extracted object.
///
/// Receives `(raw_text, object)` and returns `Err(reason)` to reject it.
pub type ValidatorFn = Arc<dyn Fn(&str, &JsonObject) -> Result<(), String> + Send + Sync>;

/// How many corrective re-prompts to allow, and what counts as valid.
///
/// # Example
///
/// ```
/// use clayquest::retry::RetryConfig;
///
/// let config = RetryConfig::new(2).requiring_keys(&["title", "pages"]);
/// assert_eq!(config.max_retries, 2);
/// ```
#[derive(Clone)]
pub struct RetryConfig {
    /// Re-prompts after the initial call. Capped at 5.
    pub max_retries: u32,

    /// Runs after extraction succeeds.
    pub validator: Option<ValidatorFn>,
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries: max_retries.min(5),
            validator: None,
        }
    }

    pub fn with_validator(
        mut self,
        f: impl Fn(&str, &JsonObject) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(f));
        self
    }

    /// Shorthand: the listed keys must be present and non-null.
    pub fn requiring_keys(self, keys: &[&str]) -> Self {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.with_validator(move |_raw, object| {
            for key in &keys {
                match object.get(key.as_str()) {
                    None => return Err(format!("missing required key: '{}'", key)),
                    Some(v) if v.is_null() => {
                        return Err(format!("required key '{}' is null", key))
                    }
                    _ => {}
                }
            }
            Ok(())
        })
    }

    /// `Some(reason)` if the answer should be re-prompted.
    pub fn check(&self, raw: &str, extracted: &Result<JsonObject, ParseError>) -> Option<String> {
        match extracted {
            Err(e) => Some(e.to_string()),
            Ok(object) => self
                .validator
                .as_ref()
                .and_then(|validate| validate(raw, object).err()),
        }
    }
}

impl std::fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

/// The turns appended to a conversation to ask for a corrected answer.
///
/// A blank previous answer is not echoed back: the Messages API rejects
/// empty assistant turns.
pub fn correction_turns(previous: &str, reason: &str) -> Vec<ChatMessage> {
    let mut turns = Vec::with_capacity(2);
    if !previous.trim().is_empty() {
        turns.push(ChatMessage::assistant(previous));
    }
    turns.push(ChatMessage::user(format!(
        "Your previous response was invalid: {}. Please try again with the correct format.",
        reason
    )));
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Role;
    use crate::output_parser::extract;

    #[test]
    fn test_retry_config_capped_at_5() {
        assert_eq!(RetryConfig::new(10).max_retries, 5);
        assert!(RetryConfig::new(1).validator.is_none());
    }

    #[test]
    fn test_requiring_keys() {
        let config = RetryConfig::new(1).requiring_keys(&["title", "pages"]);
        let good = extract(r#"{"title": "T", "pages": []}"#);
        assert_eq!(config.check("", &good), None);

        let missing = extract(r#"{"title": "T"}"#);
        let reason = config.check("", &missing).unwrap();
        assert!(reason.contains("'pages'"));

        let null = extract(r#"{"title": null, "pages": []}"#);
        assert!(config.check("", &null).unwrap().contains("is null"));
    }

    #[test]
    fn test_parse_failure_needs_retry_without_validator() {
        let config = RetryConfig::new(1);
        let bad = extract("no json here");
        assert!(config.check("no json here", &bad).is_some());
    }

    #[test]
    fn test_custom_validator_sees_object() {
        let config = RetryConfig::new(1).with_validator(|_raw, object| {
            match object.get("pages").and_then(|p| p.as_array()) {
                Some(pages) if pages.len() == 4 => Ok(()),
                _ => Err("expected 4 pages".into()),
            }
        });
        let three = extract(r#"{"pages": [1, 2, 3]}"#);
        assert_eq!(config.check("", &three).as_deref(), Some("expected 4 pages"));
    }

    #[test]
    fn test_correction_turns() {
        let turns = correction_turns("{bad", "missing title");
        assert_eq!(turns.len(), 2);
        let (assistant, user) = (&turns[0], &turns[1]);
        assert_eq!(assistant.role, Role::Assistant);
        assert_eq!(assistant.content, "{bad");
        assert_eq!(user.role, Role::User);
        assert!(user.content.starts_with("Your previous response was invalid: missing title."));
    }

    #[test]
    fn test_blank_answer_is_not_echoed() {
        for previous in ["", "  \n "] {
            let turns = correction_turns(previous, "empty response");
            assert_eq!(turns.len(), 1);
            assert_eq!(turns[0].role, Role::User);
        }
    }
}
