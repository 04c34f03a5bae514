//! Visual critique helpers
//!
//! The critique stage sees the analyzer and designer outputs side by side plus
//! a screenshot, and answers either with an approval line or with an improved
//! layout JSON that feeds a JSON-engineering re-run.

use serde::Serialize;
use serde_json::Value;
use uxpal_extraction::{CANONICAL_SEPARATOR, extract_json_repaired};
use uxpal_prompt_template::{Placeholder, PromptBindings, compose};

/// Line a critic emits when the rendered design needs no changes.
pub const APPROVAL_MARKER: &str = "DESIGN REVIEW: APPROVED";

/// Characters of each upstream output shown to the critic.
pub const REVIEW_EXCERPT_CHARS: usize = 2000;

/// Separates the analyzer and designer segments in the persisted critique input.
pub const VISUAL_SEGMENT_DELIMITER: &str = "\n\n---\n\n";

pub const SCREENSHOT_ATTACHED: &str = "[Screenshot of the rendered design attached]";
pub const SCREENSHOT_MISSING: &str = "[No screenshot available]";

const REVIEWER_APPENDIX_HEADING: &str = "## Previous Stage Output (Stage 4: Design Reviewer):";

/// How the critique stage answered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approved,
    Improved { json: Value },
    Unusable { reason: String },
}

/// Classify a critique response. Approval wins over any JSON in the text.
#[must_use]
pub fn classify(response: &str) -> ReviewVerdict {
    if response.contains(APPROVAL_MARKER) {
        return ReviewVerdict::Approved;
    }
    match extract_json_repaired(response) {
        Ok(json) => ReviewVerdict::Improved { json },
        Err(e) => ReviewVerdict::Unusable {
            reason: e.last_error,
        },
    }
}

/// Join analyzer and designer outputs into the text recorded as the
/// critique's input. The prompt binds both outputs separately through
/// [`critique_bindings`].
#[must_use]
pub fn visual_input(analyzer: &str, designer: &str) -> String {
    format!("{analyzer}{VISUAL_SEGMENT_DELIMITER}{designer}")
}

/// Split a bare critique input at the first delimiter.
///
/// Only a fallback for callers that do not bind the outputs through
/// [`critique_bindings`]: a horizontal rule inside the analyzer text moves
/// the split point. Input without a delimiter is designer output only.
#[must_use]
pub fn split_visual_input(input: &str) -> (&str, &str) {
    input
        .split_once(VISUAL_SEGMENT_DELIMITER)
        .unwrap_or(("", input))
}

/// Bind the analyzer and designer excerpts the critique template shows.
#[must_use]
pub fn critique_bindings(analyzer: &str, designer: &str) -> PromptBindings {
    let mut bindings = PromptBindings::new();
    bindings
        .bind(Placeholder::AnalyzerOutput, excerpt(analyzer))
        .bind(Placeholder::DesignerOutput, excerpt(designer));
    bindings
}

/// The first [`REVIEW_EXCERPT_CHARS`] characters of `text`.
#[must_use]
pub fn excerpt(text: &str) -> String {
    text.chars().take(REVIEW_EXCERPT_CHARS).collect()
}

/// Wrap improved JSON in the rationale envelope JSON engineering expects.
#[must_use]
pub fn reviewer_envelope(json: &Value) -> String {
    let pretty = serde_json::to_string_pretty(json).unwrap_or_else(|_| json.to_string());
    format!(
        "REVIEWER IMPROVEMENTS:\n\n{pretty}\n\n{CANONICAL_SEPARATOR}\n\n\
         Design improvements made by the visual reviewer based on the rendered screenshot."
    )
}

/// Compose a reviewer JSON-engineering prompt.
///
/// Templates without a `{{REVIEWER_OUTPUT}}` slot get the reviewer output
/// appended under a heading instead.
#[must_use]
pub fn compose_with_reviewer_output(template: &str, bindings: &PromptBindings) -> String {
    let composed = compose(template, bindings);
    match bindings.get(Placeholder::ReviewerOutput) {
        Some(output) if !template.contains(Placeholder::ReviewerOutput.token()) => {
            format!("{composed}\n\n{REVIEWER_APPENDIX_HEADING}\n{output}")
        }
        _ => composed,
    }
}
