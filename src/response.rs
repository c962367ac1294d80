//! Parsing of LLM replies into typed JSON.
//!
//! Model output is treated as untrusted text. It may be wrapped in
//! markdown code fences, preceded by prose, or followed by commentary.
//! [`parse_json`] strips fences, then tries each balanced JSON object or
//! array in order until one deserializes. Nothing here panics.

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("no JSON object or array found in model response")]
    NoJson,
    #[error("model response is not valid for the expected shape: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Remove a surrounding ```` ``` ```` / ```` ```json ```` fence, if any.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Slice of the first balanced `{...}` or `[...]` in `text`.
///
/// Brackets inside JSON strings (including escaped quotes) are ignored.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    balanced_prefix(&text[start..])
}

/// Every balanced `{...}` or `[...]` in `text`, ordered by opening bracket.
/// Nested values follow the value that contains them.
pub fn json_candidates(text: &str) -> impl Iterator<Item = &str> {
    text.char_indices()
        .filter(|&(_, c)| c == '{' || c == '[')
        .filter_map(move |(i, _)| balanced_prefix(&text[i..]))
}

/// The balanced value opening at the first byte of `text`.
fn balanced_prefix(text: &str) -> Option<&str> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in text.as_bytes().iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&text[..offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Deserialize the first JSON value in `text` that has the shape of `T`.
///
/// Prose such as "see [1]" ahead of the real payload is skipped because it
/// does not deserialize. The error for the earliest candidate is reported
/// when none fit.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, ResponseError> {
    let body = strip_code_fences(text);
    let mut first_err = None;
    for candidate in json_candidates(body) {
        match serde_json::from_str(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    Err(first_err.map_or(ResponseError::NoJson, ResponseError::Invalid))
}
