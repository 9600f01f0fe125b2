//! # Structured output extraction
//!
//! Pulls a single JSON object out of free-form model text. Handles markdown
//! fences, prose around the object, and braces that appear inside string
//! values.
//!
//! | Function | Use Case |
//! |----------|----------|
//! | [`extract`] | Untyped JSON object |
//! | [`extract_as`] | Typed struct; missing fields are an error |
//! | [`extract_with_strategy`] | Object plus the [`Strategy`] that found it |

pub mod error;
pub mod extract;
pub mod json;

pub use error::ParseError;
pub use json::{extract, extract_as, extract_with_strategy, JsonObject, Strategy};
