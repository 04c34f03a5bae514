//! Parsing of critic responses
//!
//! A critique is split into sections by `---MARKER---` lines. A section runs
//! from just after its marker to the next marker or the end of the text. The
//! literal `NONE` in a list section means the list is empty.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use uxpal_extraction::extract_json_repaired;

use super::QaError;

static MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"-{3}\s*(ISSUES-FOUND|FIXED-JSON|CHANGES-MADE|CHANGE-LOG)\s*-{3}").unwrap()
});

const EMPTY_SENTINEL: &str = "NONE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Issues,
    FixedJson,
    Changes,
    ChangeLog,
}

impl Section {
    fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "ISSUES-FOUND" => Some(Self::Issues),
            "FIXED-JSON" => Some(Self::FixedJson),
            "CHANGES-MADE" => Some(Self::Changes),
            "CHANGE-LOG" => Some(Self::ChangeLog),
            _ => None,
        }
    }
}

/// One parsed critique.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QaResponse {
    pub issues: Vec<String>,
    /// Complete replacement document, when the critic supplied one.
    pub fixed_json: Option<Value>,
    pub changes: Vec<String>,
    pub change_log: Vec<String>,
}

/// Parse a critique response.
///
/// # Errors
///
/// `QaError::MalformedResponse` when the text has no `ISSUES-FOUND` section.
pub fn parse_qa_response(text: &str) -> Result<QaResponse, QaError> {
    let markers: Vec<_> = MARKER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let section = Section::from_marker(caps.get(1)?.as_str())?;
            Some((section, whole.start(), whole.end()))
        })
        .collect();

    let mut response = QaResponse::default();
    let mut saw_issues = false;

    for (i, (section, _, body_start)) in markers.iter().enumerate() {
        let body_end = markers.get(i + 1).map_or(text.len(), |(_, start, _)| *start);
        let body = text[*body_start..body_end].trim();
        match section {
            Section::Issues => {
                saw_issues = true;
                response.issues = list_items(body);
            }
            Section::Changes => response.changes = list_items(body),
            Section::ChangeLog => response.change_log = list_items(body),
            Section::FixedJson => {
                if body.is_empty() || body == EMPTY_SENTINEL {
                    continue;
                }
                match extract_json_repaired(body) {
                    Ok(json) => response.fixed_json = Some(json),
                    Err(e) => warn!(error = %e, "Critic supplied fixed JSON that does not parse"),
                }
            }
        }
    }

    if !saw_issues {
        return Err(QaError::MalformedResponse(
            "response has no ---ISSUES-FOUND--- section".to_string(),
        ));
    }
    Ok(response)
}

fn list_items(body: &str) -> Vec<String> {
    if body == EMPTY_SENTINEL {
        return Vec::new();
    }
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
