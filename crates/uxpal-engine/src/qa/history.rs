//! QA iteration history and its renderings
//!
//! The same history feeds three consumers: the critic prompt (so it does not
//! repeat a failed fix), the change-log file, and the envelope handed to the
//! next stage.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use uxpal_extraction::CANONICAL_SEPARATOR;

const NO_PREVIOUS_ATTEMPTS: &str = "No previous attempts.";

/// One completed pass of the QA loop. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaIterationRecord {
    /// 1-based.
    pub iteration: u32,
    pub issues: Vec<String>,
    pub changes: Vec<String>,
    #[serde(default)]
    pub change_log: Vec<String>,
}

/// Text bound as `{{FIX_HISTORY}}`.
///
/// ```rust
/// use uxpal_engine::qa::{QaIterationRecord, fix_history_text};
///
/// assert_eq!(fix_history_text(&[]), "No previous attempts.");
///
/// let text = fix_history_text(&[QaIterationRecord {
///     iteration: 1,
///     issues: vec!["a".into(), "b".into()],
///     changes: vec![],
///     change_log: vec![],
/// }]);
/// assert!(text.contains("**Iteration 1:**\nIssues: a, b\nChanges: None\n"));
/// ```
#[must_use]
pub fn fix_history_text(history: &[QaIterationRecord]) -> String {
    if history.is_empty() {
        return NO_PREVIOUS_ATTEMPTS.to_string();
    }
    let mut text = String::from("## Previous Attempts:\n");
    for record in history {
        text.push_str(&format!(
            "\n**Iteration {}:**\nIssues: {}\nChanges: {}\n",
            record.iteration,
            joined_or_none(&record.issues),
            joined_or_none(&record.changes),
        ));
    }
    text
}

fn joined_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "None".to_string()
    } else {
        items.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogIteration {
    pub iteration_number: u32,
    pub issues_found: usize,
    pub changes_made: usize,
    pub issues: Vec<String>,
    pub changes: Vec<String>,
    pub detailed_change_log: Vec<String>,
}

/// Audit file written next to the QA history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLog {
    pub timestamp: String,
    pub total_iterations: usize,
    pub total_issues_found: usize,
    pub total_changes_made: usize,
    pub iterations: Vec<ChangeLogIteration>,
}

impl ChangeLog {
    #[must_use]
    pub fn from_history(history: &[QaIterationRecord]) -> Self {
        let iterations: Vec<_> = history
            .iter()
            .map(|record| ChangeLogIteration {
                iteration_number: record.iteration,
                issues_found: record.issues.len(),
                changes_made: record.changes.len(),
                issues: record.issues.clone(),
                changes: record.changes.clone(),
                detailed_change_log: record.change_log.clone(),
            })
            .collect();
        Self {
            timestamp: chrono::Local::now().to_rfc3339(),
            total_iterations: iterations.len(),
            total_issues_found: iterations.iter().map(|i| i.issues_found).sum(),
            total_changes_made: iterations.iter().map(|i| i.changes_made).sum(),
            iterations,
        }
    }
}

/// Rationale, separator and JSON, in the shape the JSON-engineering stage
/// expects from the designer.
#[must_use]
pub fn qa_envelope(json: &Value, history: &[QaIterationRecord]) -> String {
    let pretty = serde_json::to_string_pretty(json).unwrap_or_else(|_| json.to_string());
    let mut narrative = format!(
        "QA VALIDATION SUMMARY:\n\nThe layout was checked against the design system over {} iteration(s).",
        history.len()
    );
    let fixed: Vec<&String> = history.iter().flat_map(|r| &r.issues).collect();
    if fixed.is_empty() {
        narrative.push_str("\nNo issues were reported.");
    } else {
        narrative.push_str("\nIssues addressed:");
        for issue in fixed {
            narrative.push_str("\n- ");
            narrative.push_str(issue.trim_start_matches("- "));
        }
    }
    format!("{narrative}\n\n{CANONICAL_SEPARATOR}\n\n{pretty}")
}
