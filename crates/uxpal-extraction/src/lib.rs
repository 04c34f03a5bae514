//! Recovering JSON from free-form LLM output
//!
//! Model responses mix rationale prose, markdown fences and separator markers
//! around the JSON payload. [`extract_json`] peels those layers in a fixed
//! order and parses after each one, returning the first JSON object that
//! parses. Scalars, arrays and `null` never count as a recovered payload:
//!
//! 1. the whole trimmed text
//! 2. the text after the first rationale separator
//! 3. the content of the first fenced code block
//! 4. the first balanced `{...}` span
//!
//! [`extract_json_repaired`] adds a final repair pass (comments, trailing
//! commas, over-escaped punctuation) used by the design QA loop.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Separator spellings that delimit rationale from the JSON payload.
pub const RATIONALE_SEPARATORS: [&str; 2] =
    ["---RATIONALE-SEPARATOR---", "---RATIONALE_SEPARATOR---"];

/// The spelling used when uxpal writes an envelope itself.
pub const CANONICAL_SEPARATOR: &str = RATIONALE_SEPARATORS[0];

/// Maximum characters of unparseable text kept on an [`ExtractionError`].
pub const SNIPPET_CHARS: usize = 500;

static FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)\n?```").unwrap());

static TRAILING_COMMA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r",(\s*[}\]])").unwrap());

/// Punctuation that models sometimes backslash-escape inside JSON strings.
const OVER_ESCAPED: [char; 5] = ['%', '&', '$', '#', '@'];

/// No JSON object could be recovered from the text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no JSON object could be recovered: {last_error}")]
pub struct ExtractionError {
    /// Parser message from the last attempt
    pub last_error: String,
    /// Leading characters of the last candidate text
    pub snippet: String,
}

impl ExtractionError {
    fn new(last_error: impl Into<String>, candidate: &str) -> Self {
        Self {
            last_error: last_error.into(),
            snippet: candidate.chars().take(SNIPPET_CHARS).collect(),
        }
    }
}

/// Extract a JSON object from raw LLM text.
///
/// ```rust
/// use uxpal_extraction::extract_json;
///
/// let text = "Rationale here ---RATIONALE-SEPARATOR--- ```json\n{\"a\": 1}\n```";
/// assert_eq!(extract_json(text).unwrap(), serde_json::json!({"a": 1}));
/// ```
pub fn extract_json(text: &str) -> Result<Value, ExtractionError> {
    extract_inner(text, false)
}

/// Like [`extract_json`], with a final repair pass before giving up.
pub fn extract_json_repaired(text: &str) -> Result<Value, ExtractionError> {
    extract_inner(text, true)
}

fn extract_inner(text: &str, repair: bool) -> Result<Value, ExtractionError> {
    let mut candidate = text.trim();
    let mut last_error = match parse(candidate) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Some(after) = after_separator(candidate) {
        candidate = after.trim();
        match parse(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = e,
        }
    }

    if let Some(inner) = fenced_block(candidate) {
        candidate = inner.trim();
        match parse(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = e,
        }
    }

    if let Some(span) = balanced_object(candidate) {
        candidate = span;
        match parse(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = e,
        }
    }

    if repair {
        let repaired = repair_json(candidate);
        debug!(chars = repaired.len(), "Retrying JSON parse after repair");
        match parse(&repaired) {
            Ok(value) => return Ok(value),
            Err(e) => return Err(ExtractionError::new(e, &repaired)),
        }
    }

    Err(ExtractionError::new(last_error, candidate))
}

fn parse(candidate: &str) -> Result<Value, String> {
    if candidate.is_empty() {
        return Err("empty input".to_string());
    }
    match serde_json::from_str(candidate).map_err(|e| e.to_string())? {
        value @ Value::Object(_) => Ok(value),
        other => Err(format!("expected a JSON object, found {}", kind(&other))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Text after the first separator occurrence, across all spellings.
#[must_use]
pub fn after_separator(text: &str) -> Option<&str> {
    split_at_separator(text).map(|(_, after)| after)
}

/// Split into `(rationale, payload)` at the first separator occurrence.
#[must_use]
pub fn split_at_separator(text: &str) -> Option<(&str, &str)> {
    RATIONALE_SEPARATORS
        .iter()
        .filter_map(|sep| text.find(sep).map(|pos| (pos, sep.len())))
        .min_by_key(|(pos, _)| *pos)
        .map(|(pos, len)| (&text[..pos], &text[pos + len..]))
}

/// Content of the first fenced code block (tagged `json` or untagged).
#[must_use]
pub fn fenced_block(text: &str) -> Option<&str> {
    FENCE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// The first balanced `{...}` span, starting at the first `{`.
///
/// Braces inside JSON strings do not count toward depth. When the object is
/// never closed the span runs to the end of the text.
#[must_use]
pub fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    Some(&text[start..])
}

/// Repair common model mistakes that make otherwise-valid JSON unparseable.
///
/// Strips `//` line comments outside strings, removes trailing commas before
/// `}`/`]`, and un-escapes `\%`, `\&`, `\$`, `\#`, `\@`.
#[must_use]
pub fn repair_json(text: &str) -> String {
    let without_comments = strip_line_comments(text);
    let without_commas = TRAILING_COMMA_RE.replace_all(&without_comments, "$1");
    unescape_punctuation(&without_commas)
}

fn strip_line_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(ch) = chars.next() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        if ch == '/' && chars.peek() == Some(&'/') {
            while let Some(&next) = chars.peek() {
                if next == '\n' {
                    break;
                }
                chars.next();
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        }
        out.push(ch);
    }
    out
}

fn unescape_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.peek() {
                Some(next) if OVER_ESCAPED.contains(next) => continue,
                Some('\\') => {
                    // keep escaped backslashes intact
                    out.push('\\');
                    out.push('\\');
                    chars.next();
                    continue;
                }
                _ => {}
            }
        }
        out.push(ch);
    }
    out
}
