//! Shared extraction strategies for model output.
//!
//! Fence stripping and the string-aware brace scan. [`json`](super::json)
//! layers these into the full extraction pipeline.

use regex::Regex;
use std::sync::LazyLock;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:json)?").expect("fence pattern is valid"));

static GREEDY_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("object pattern is valid"));

/// Remove every markdown code-fence marker (`` ```json `` or bare `` ``` ``).
///
/// Only the markers go; whatever sat between them stays in place.
///
/// # Examples
///
/// ```
/// use clayquest::output_parser::extract::strip_code_fences;
///
/// assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```").trim(), "{\"a\":1}");
/// ```
pub fn strip_code_fences(text: &str) -> String {
    FENCE.replace_all(text, "").into_owned()
}

/// Find the JSON object that starts at the first `{` by counting brace depth.
///
/// Quote state and backslash escapes are tracked so braces inside string
/// values do not move the depth. Returns `None` when there is no `{` or the
/// object never closes.
///
/// # Examples
///
/// ```
/// use clayquest::output_parser::extract::find_balanced_object;
///
/// let input = r#"info: {"msg": "a {nested} example"} tail"#;
/// assert_eq!(find_balanced_object(input), Some(r#"{"msg": "a {nested} example"}"#));
/// ```
pub fn find_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Greedy match from the first `{` to the last `}`.
pub fn find_greedy_object(text: &str) -> Option<&str> {
    GREEDY_OBJECT.find(text).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── strip_code_fences ──

    #[test]
    fn strips_json_fence() {
        let input = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(input).trim(), "{\"a\": 1}");
    }

    #[test]
    fn strips_bare_and_uppercase_fences() {
        let input = "before ```JSON\n{}\n``` middle ```\n[]\n```";
        let stripped = strip_code_fences(input);
        assert!(!stripped.contains("```"));
        assert!(stripped.contains("before"));
        assert!(stripped.contains("middle"));
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(strip_code_fences("plain text"), "plain text");
    }

    // ── find_balanced_object ──

    #[test]
    fn balanced_simple() {
        let input = r#"Result: {"a": [1, 2]} done"#;
        assert_eq!(find_balanced_object(input), Some(r#"{"a": [1, 2]}"#));
    }

    #[test]
    fn balanced_nested_objects() {
        let input = r#"{"outer": {"inner": {"x": 1}}} trailing }"#;
        assert_eq!(
            find_balanced_object(input),
            Some(r#"{"outer": {"inner": {"x": 1}}}"#)
        );
    }

    #[test]
    fn balanced_ignores_braces_in_strings() {
        let input = r#"Here is info: {"msg": "a {nested} example", "ok": true} extra text"#;
        assert_eq!(
            find_balanced_object(input),
            Some(r#"{"msg": "a {nested} example", "ok": true}"#)
        );
    }

    #[test]
    fn balanced_handles_escaped_quotes() {
        let input = r#"x {"msg": "say \"}\" loudly", "n": 2} y"#;
        assert_eq!(
            find_balanced_object(input),
            Some(r#"{"msg": "say \"}\" loudly", "n": 2}"#)
        );
    }

    #[test]
    fn balanced_takes_first_object() {
        let input = r#"{"a": 1} and {"b": 2}"#;
        assert_eq!(find_balanced_object(input), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn balanced_unclosed_is_none() {
        assert!(find_balanced_object(r#"{"a": {"b": 1}"#).is_none());
    }

    #[test]
    fn balanced_no_brace_is_none() {
        assert!(find_balanced_object("no braces here").is_none());
    }

    // ── find_greedy_object ──

    #[test]
    fn greedy_spans_first_to_last() {
        let input = "a {x} b {y} c";
        assert_eq!(find_greedy_object(input), Some("{x} b {y}"));
    }

    #[test]
    fn greedy_crosses_newlines() {
        let input = "{\n\"a\": 1\n}";
        assert_eq!(find_greedy_object(input), Some(input));
    }
}
