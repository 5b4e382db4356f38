//! Cleanup and parsing of raw model output.
//!
//! Models wrap JSON in markdown fences or lead with a sentence of prose
//! often enough that the raw text is normalised before parsing:
//!
//! 1. trim, drop a leading ```` ``` ```` / ```` ```json ```` fence and a trailing fence
//! 2. if the text still does not open with `{` or `[`, cut everything before
//!    the first `{` or `[`
//! 3. if an object or array was found, parse the first JSON value and ignore
//!    trailing chatter after it; otherwise the whole text must be JSON
//!
//! A parse failure here is deterministic for a given prompt, so callers
//! treat it as fatal rather than retrying.

use serde_json::Value;

use crate::{GatewayError, Result};

/// Maximum number of characters of raw output carried in a parse error.
pub const PREVIEW_CHARS: usize = 200;

/// Strip code fences and leading prose, returning the slice that should
/// hold the JSON document.
pub fn clean_response(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(rest) = text.strip_prefix("```") {
        // language tag, e.g. ```json
        text = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text = text.trim();

    if !text.starts_with(['{', '[']) {
        if let Some(idx) = text.find(['{', '[']) {
            text = &text[idx..];
        }
    }
    text
}

/// Parse model output into a structured artifact.
pub fn parse_structured(raw: &str, schema_hint: &str) -> Result<Value> {
    let cleaned = clean_response(raw);
    // Prose such as "3 typhoons expected" must not parse as the number 3.
    let parsed = if cleaned.starts_with(['{', '[']) {
        let mut values = serde_json::Deserializer::from_str(cleaned).into_iter::<Value>();
        match values.next() {
            Some(result) => result,
            None => serde_json::from_str::<Value>(cleaned),
        }
    } else {
        serde_json::from_str::<Value>(cleaned)
    };
    parsed.map_err(|source| GatewayError::SchemaParse {
        preview: preview(raw),
        schema_hint: schema_hint.to_string(),
        source,
    })
}

fn preview(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
