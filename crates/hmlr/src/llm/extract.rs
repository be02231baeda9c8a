//! Lenient extraction of JSON payloads from model output.
//!
//! Models occasionally wrap their JSON in prose or code fences even in
//! strict mode; callers get one forgiving pass before the response is
//! treated as a parse failure.

use serde::de::DeserializeOwned;

/// Parse a typed value out of raw model output
///
/// Tries the raw string first, then the outermost `{...}` or `[...]`
/// span. Returns `None` when nothing parses.
pub fn parse_lenient<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let trimmed = strip_code_fences(raw.trim());

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(span) = outer_span(trimmed, '{', '}') {
        if let Ok(value) = serde_json::from_str(span) {
            return Some(value);
        }
    }
    if let Some(span) = outer_span(trimmed, '[', ']') {
        if let Ok(value) = serde_json::from_str(span) {
            return Some(value);
        }
    }

    None
}

/// The outermost `open...close` span of the text
fn outer_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Strip a surrounding markdown code fence, if any
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}
