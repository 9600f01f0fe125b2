//! JSON object extraction from free-form model output.
//!
//! Provides [`extract`] for the untyped object and [`extract_as`] for typed
//! structs, using a layered strategy that returns on the first success.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::output_parser::error::{truncate, ParseError};
use crate::output_parser::extract::{find_balanced_object, find_greedy_object, strip_code_fences};

/// A JSON object as produced by the extractor.
pub type JsonObject = Map<String, Value>;

/// Which extraction strategy produced the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// The fence-stripped text parsed as-is.
    Direct,
    /// String-aware brace-depth scan from the first `{`.
    BraceScan,
    /// First `{` to last `}`.
    Greedy,
}

/// Extract a single JSON object from model output.
///
/// Strategies (in order):
/// 1. Strip markdown fence markers, then parse the trimmed text directly
/// 2. Brace-counting scan from the first `{` (string-literal aware)
/// 3. Greedy match from the first `{` to the last `}`
///
/// # Examples
///
/// ```
/// use clayquest::output_parser::extract;
///
/// let obj = extract("```json\n{\"a\":1}\n```").unwrap();
/// assert_eq!(obj["a"], 1);
/// ```
pub fn extract(raw: &str) -> Result<JsonObject, ParseError> {
    extract_with_strategy(raw).map(|(obj, _)| obj)
}

/// Same as [`extract`], also reporting which strategy succeeded.
pub fn extract_with_strategy(raw: &str) -> Result<(JsonObject, Strategy), ParseError> {
    if raw.trim().is_empty() {
        return Err(ParseError::EmptyResponse);
    }

    let stripped = strip_code_fences(raw);
    let cleaned = stripped.trim();

    if let Some(obj) = parse_object(cleaned) {
        return Ok((obj, Strategy::Direct));
    }

    if let Some(obj) = find_balanced_object(cleaned).and_then(parse_object) {
        return Ok((obj, Strategy::BraceScan));
    }

    if let Some(obj) = find_greedy_object(cleaned).and_then(parse_object) {
        return Ok((obj, Strategy::Greedy));
    }

    Err(ParseError::Unparseable {
        text: raw.to_string(),
    })
}

/// Extract an object and deserialize it into `T`.
///
/// A found object that is missing a required field is a
/// [`ParseError::DeserializationFailed`], never a partial value.
pub fn extract_as<T: DeserializeOwned>(raw: &str) -> Result<T, ParseError> {
    let obj = extract(raw)?;
    let value = Value::Object(obj);
    serde_json::from_value::<T>(value.clone()).map_err(|e| ParseError::DeserializationFailed {
        reason: e.to_string(),
        raw_json: truncate(&value.to_string(), 200),
    })
}

fn parse_object(candidate: &str) -> Option<JsonObject> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Kv {
        key: String,
    }

    #[test]
    fn direct_json_object() {
        let (obj, strategy) = extract_with_strategy(r#"{"key": "value"}"#).unwrap();
        assert_eq!(obj["key"], "value");
        assert_eq!(strategy, Strategy::Direct);
    }

    #[test]
    fn fenced_equals_unfenced() {
        let fenced = extract("```json\n{\"a\":1}\n```").unwrap();
        let plain = extract("{\"a\":1}").unwrap();
        assert_eq!(fenced, plain);
        assert_eq!(Value::Object(fenced), json!({"a": 1}));
    }

    #[test]
    fn bare_fence() {
        let obj = extract("```\n{\"key\": \"value\"}\n```").unwrap();
        assert_eq!(obj["key"], "value");
    }

    #[test]
    fn braces_inside_strings_use_scan() {
        let input = r#"Here is info: {"msg": "a {nested} example", "ok": true} extra text"#;
        let (obj, strategy) = extract_with_strategy(input).unwrap();
        assert_eq!(
            Value::Object(obj),
            json!({"msg": "a {nested} example", "ok": true})
        );
        assert_eq!(strategy, Strategy::BraceScan);
    }

    #[test]
    fn invalid_first_object_fails_cleanly() {
        let result = extract_with_strategy(r#"{draft} {"a": 1}"#);
        assert!(matches!(result, Err(ParseError::Unparseable { .. })));
    }

    #[test]
    fn stray_quote_before_object_does_not_confuse_scan() {
        let input = "He said \" then {\"a\": {\"b\": 2}} and left";
        let (obj, strategy) = extract_with_strategy(input).unwrap();
        assert_eq!(obj["a"]["b"], 2);
        assert_eq!(strategy, Strategy::BraceScan);
    }

    #[test]
    fn no_brace_is_an_error() {
        let err = extract("there is no object in here").unwrap_err();
        match err {
            ParseError::Unparseable { text } => assert_eq!(text, "there is no object in here"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn top_level_array_is_not_an_object() {
        assert!(extract("[1, 2, 3]").is_err());
    }

    #[test]
    fn empty_response_fails() {
        assert!(matches!(extract("   "), Err(ParseError::EmptyResponse)));
    }

    #[test]
    fn extract_as_typed() {
        let result: Kv = extract_as("Sure! {\"key\": \"value\"} hope that helps").unwrap();
        assert_eq!(result.key, "value");
    }

    #[test]
    fn extract_as_missing_field() {
        let err = extract_as::<Kv>(r#"{"other": 1}"#).unwrap_err();
        assert!(matches!(err, ParseError::DeserializationFailed { .. }));
    }
}
