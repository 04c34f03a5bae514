//! Design QA: a bounded critique-and-patch loop over the designer's layout
//!
//! Each iteration sends the current JSON, the design-system reference and the
//! fix history to a critic, then parses the critique. The loop ends when the
//! critic reports no issues, repeats the previous iteration's issues verbatim,
//! or the iteration cap is reached. A replacement document from the critic is
//! taken whole; nothing is merged.
//!
//! QA is best-effort. Unextractable input skips the loop, and any failure
//! inside an iteration ends it with the pre-QA document. Only cancellation is
//! returned as an error.

mod history;
mod response;

pub use history::{ChangeLog, ChangeLogIteration, QaIterationRecord, fix_history_text, qa_envelope};
pub use response::{QaResponse, parse_qa_response};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use uxpal_config::MAX_QA_ITERATIONS;
use uxpal_extraction::extract_json_repaired;
use uxpal_llm::{LlmBackend, LlmError, LlmInvocation};
use uxpal_prompt_template::{Placeholder, PromptBindings, TemplateStore, compose};
use uxpal_utils::error::{ErrorCategory, UserFriendlyError};
use uxpal_utils::types::RunId;

use crate::artifacts::ArtifactStore;
use crate::pipeline::QA_TEMPLATE;

const QA_STAGE_LABEL: &str = "Design QA";

#[derive(Debug, Clone, thiserror::Error)]
pub enum QaError {
    #[error("QA template unavailable: {0}")]
    Template(String),

    #[error("QA critique call failed: {0}")]
    Provider(#[from] LlmError),

    #[error("QA critique response is malformed: {0}")]
    MalformedResponse(String),

    #[error("QA loop was cancelled")]
    Cancelled,
}

impl UserFriendlyError for QaError {
    fn user_message(&self) -> String {
        match self {
            Self::Template(reason) => format!("The design QA prompt could not be loaded: {reason}"),
            Self::Provider(err) => format!("The design QA critic could not be reached: {err}"),
            Self::MalformedResponse(reason) => {
                format!("The design QA critic answered in an unexpected format: {reason}")
            }
            Self::Cancelled => "Design QA was cancelled".to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Cancelled => None,
            _ => Some("The layout produced before QA is used unchanged.".to_string()),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Template(_) => vec![format!(
                "Add {QA_TEMPLATE} to the prompts directory or disable QA with [qa] enabled = false"
            )],
            Self::Provider(err) => err.suggestions(),
            Self::MalformedResponse(_) => {
                vec!["Re-run QA for the run: uxpal qa <run_id>".to_string()]
            }
            Self::Cancelled => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Template(_) => ErrorCategory::Configuration,
            Self::Provider(_) => ErrorCategory::ProviderIntegration,
            Self::MalformedResponse(_) => ErrorCategory::Validation,
            Self::Cancelled => ErrorCategory::Cancellation,
        }
    }
}

/// Terminal state of one QA loop.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QaOutcome {
    /// The critic reported no issues.
    Passed,
    /// Two consecutive iterations reported the same issues.
    Stagnated,
    /// The iteration cap was reached with issues outstanding.
    CapReached,
    /// The designer output held no extractable JSON.
    Skipped,
    /// The cap was 0.
    Disabled,
    /// An iteration failed; the pre-QA document stands.
    Failed,
}

impl QaOutcome {
    /// Whether the loop's document may replace the designer output.
    #[must_use]
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Passed | Self::Stagnated | Self::CapReached)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QaResult {
    pub outcome: QaOutcome,
    /// Final document; the pre-QA document when the loop failed, `None`
    /// when the loop never had one.
    pub json: Option<Value>,
    pub history: Vec<QaIterationRecord>,
    /// Critic calls that completed, including a final no-issue pass.
    pub iterations_run: u32,
    /// Whether any critic replacement was taken.
    pub json_replaced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl QaResult {
    fn without_document(outcome: QaOutcome) -> Self {
        Self {
            outcome,
            json: None,
            history: Vec::new(),
            iterations_run: 0,
            json_replaced: false,
            failure: None,
        }
    }

    /// The corrected document, when QA finished and changed something.
    #[must_use]
    pub fn corrected_json(&self) -> Option<&Value> {
        if self.outcome.is_usable() && self.json_replaced {
            self.json.as_ref()
        } else {
            None
        }
    }
}

/// Runs the QA loop against one backend.
pub struct DesignQaEngine {
    backend: Arc<dyn LlmBackend>,
    templates: TemplateStore,
    model: String,
    timeout: Duration,
}

impl DesignQaEngine {
    #[must_use]
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        templates: TemplateStore,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            templates,
            model: model.into(),
            timeout,
        }
    }

    /// Run up to `max_iterations` critique passes over `designer_output`.
    ///
    /// `max_iterations` is clamped to the supported cap; 0 disables QA.
    ///
    /// # Errors
    ///
    /// Only `QaError::Cancelled`. Every other failure is reported through
    /// [`QaOutcome::Failed`].
    pub async fn run(
        &self,
        run_id: &RunId,
        designer_output: &str,
        design_system: &str,
        max_iterations: u32,
        cancel: &CancellationToken,
    ) -> Result<QaResult, QaError> {
        let span = info_span!("design_qa", run_id = %run_id, max_iterations);
        self.run_inner(run_id, designer_output, design_system, max_iterations, cancel)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        run_id: &RunId,
        designer_output: &str,
        design_system: &str,
        max_iterations: u32,
        cancel: &CancellationToken,
    ) -> Result<QaResult, QaError> {
        let cap = max_iterations.min(MAX_QA_ITERATIONS);
        if cap == 0 {
            debug!("QA disabled");
            return Ok(QaResult::without_document(QaOutcome::Disabled));
        }

        let original = match extract_json_repaired(designer_output) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Designer output has no extractable JSON; skipping QA");
                return Ok(QaResult::without_document(QaOutcome::Skipped));
            }
        };

        let template = match self.templates.load(QA_TEMPLATE) {
            Ok(template) => template,
            Err(e) => {
                return Ok(failed(original, Vec::new(), 0, &QaError::Template(e.to_string())));
            }
        };

        let mut current = original.clone();
        let mut history: Vec<QaIterationRecord> = Vec::new();
        let mut replaced = false;

        for iteration in 1..=cap {
            let prompt = compose(&template, &self.bindings(&current, design_system, &history));
            let response = match self.critique(run_id, prompt, cancel).await {
                Ok(response) => response,
                Err(QaError::Cancelled) => return Err(QaError::Cancelled),
                Err(e) => return Ok(failed(original, history, iteration - 1, &e)),
            };
            let parsed = match parse_qa_response(&response) {
                Ok(parsed) => parsed,
                Err(e) => return Ok(failed(original, history, iteration - 1, &e)),
            };

            info!(
                iteration,
                issues = parsed.issues.len(),
                changes = parsed.changes.len(),
                fixed_json = parsed.fixed_json.is_some(),
                "QA iteration complete"
            );

            if parsed.issues.is_empty() {
                return Ok(QaResult {
                    outcome: QaOutcome::Passed,
                    json: Some(current),
                    history,
                    iterations_run: iteration,
                    json_replaced: replaced,
                    failure: None,
                });
            }

            if let Some(fixed) = parsed.fixed_json {
                current = fixed;
                replaced = true;
            }

            let stagnated = history
                .last()
                .is_some_and(|previous| previous.issues == parsed.issues);
            history.push(QaIterationRecord {
                iteration,
                issues: parsed.issues,
                changes: parsed.changes,
                change_log: parsed.change_log,
            });

            if stagnated {
                info!(iteration, "Critic repeated the previous issues; stopping QA");
                return Ok(QaResult {
                    outcome: QaOutcome::Stagnated,
                    json: Some(current),
                    history,
                    iterations_run: iteration,
                    json_replaced: replaced,
                    failure: None,
                });
            }
        }

        info!(iterations = cap, "QA iteration cap reached");
        Ok(QaResult {
            outcome: QaOutcome::CapReached,
            json: Some(current),
            history,
            iterations_run: cap,
            json_replaced: replaced,
            failure: None,
        })
    }

    fn bindings(
        &self,
        current: &Value,
        design_system: &str,
        history: &[QaIterationRecord],
    ) -> PromptBindings {
        let pretty = serde_json::to_string_pretty(current).unwrap_or_else(|_| current.to_string());
        PromptBindings::new()
            .with(Placeholder::DesignSystemData, design_system)
            .with(Placeholder::CurrentJson, pretty)
            .with(Placeholder::FixHistory, fix_history_text(history))
    }

    async fn critique(
        &self,
        run_id: &RunId,
        prompt: String,
        cancel: &CancellationToken,
    ) -> Result<String, QaError> {
        let invocation = LlmInvocation::new(
            run_id.as_str(),
            QA_STAGE_LABEL,
            self.model.clone(),
            self.timeout,
            prompt,
        );
        let call = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(QaError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, self.backend.invoke(invocation)) => {
                outcome.unwrap_or(Err(LlmError::Timeout { duration: self.timeout }))
            }
        };
        match call {
            Ok(result) => Ok(result.raw_response),
            Err(LlmError::Cancelled) => Err(QaError::Cancelled),
            Err(e) => Err(QaError::Provider(e)),
        }
    }
}

fn failed(
    original: Value,
    history: Vec<QaIterationRecord>,
    iterations_run: u32,
    err: &QaError,
) -> QaResult {
    warn!(error = %err, iterations_run, "QA failed; keeping the pre-QA layout");
    QaResult {
        outcome: QaOutcome::Failed,
        json: Some(original),
        history,
        iterations_run,
        json_replaced: false,
        failure: Some(err.to_string()),
    }
}

/// Write the validated document, history and change log of a QA loop that
/// ran. Disabled and skipped loops write nothing.
pub fn save_qa_artifacts(store: &ArtifactStore, run_id: &RunId, result: &QaResult) -> Result<()> {
    if matches!(result.outcome, QaOutcome::Disabled | QaOutcome::Skipped) {
        return Ok(());
    }
    if let Some(json) = &result.json {
        store.write_json(&store.qa_path(run_id, "validated"), json)?;
    }
    store.write_json(&store.qa_path(run_id, "history"), &result.history)?;
    store.write_json(
        &store.qa_path(run_id, "change_log"),
        &ChangeLog::from_history(&result.history),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineKind;
    use camino::Utf8PathBuf;
    use serde_json::json;
    use tempfile::TempDir;
    use uxpal_llm::testing::ScriptedBackend;

    const DESIGNER_OUTPUT: &str = "Layout rationale.\n---RATIONALE-SEPARATOR---\n{\"layoutContainer\": {\"name\": \"Login\"}, \"items\": []}";

    struct Fixture {
        _temp: TempDir,
        root: Utf8PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
            std::fs::create_dir_all(root.join("prompts")).unwrap();
            std::fs::write(
                root.join("prompts").join(QA_TEMPLATE),
                "DS={{DESIGN_SYSTEM_DATA}}\nJSON={{CURRENT_JSON}}\nHISTORY={{FIX_HISTORY}}",
            )
            .unwrap();
            Self { _temp: temp, root }
        }

        fn engine(&self, backend: Arc<dyn LlmBackend>) -> DesignQaEngine {
            DesignQaEngine::new(
                backend,
                TemplateStore::new(self.root.join("prompts")),
                "test-model",
                Duration::from_secs(30),
            )
        }
    }

    fn run_id() -> RunId {
        RunId::parse("20250101_120000").unwrap()
    }

    fn critique(issues: &[&str], fixed: Option<&Value>) -> String {
        let issues = if issues.is_empty() {
            "NONE".to_string()
        } else {
            issues.join("\n")
        };
        let fixed = fixed.map_or_else(|| "NONE".to_string(), Value::to_string);
        format!(
            "---ISSUES-FOUND---\n{issues}\n---FIXED-JSON---\n{fixed}\n---CHANGES-MADE---\nadjusted\n---CHANGE-LOG---\nlog line"
        )
    }

    async fn run(fx: &Fixture, backend: Arc<ScriptedBackend>, max: u32) -> QaResult {
        fx.engine(backend)
            .run(&run_id(), DESIGNER_OUTPUT, "[design system]", max, &CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_no_issues_passes_at_first_iteration() {
        let fx = Fixture::new();
        let backend = Arc::new(ScriptedBackend::new().then_ok(critique(&[], None)));

        let result = run(&fx, backend.clone(), 3).await;

        assert_eq!(result.outcome, QaOutcome::Passed);
        assert_eq!(result.iterations_run, 1);
        assert!(result.history.is_empty());
        assert_eq!(result.json, Some(json!({"layoutContainer": {"name": "Login"}, "items": []})));
        assert!(result.corrected_json().is_none());
        assert_eq!(backend.call_count(), 1);

        let prompt = &backend.calls()[0].prompt;
        assert!(prompt.starts_with("DS=[design system]\n"));
        assert!(prompt.contains("\"layoutContainer\": {\n"));
        assert!(prompt.ends_with("HISTORY=No previous attempts."));
    }

    #[tokio::test]
    async fn test_stagnation_stops_early() {
        let fx = Fixture::new();
        let backend = Arc::new(
            ScriptedBackend::new()
                .then_ok(critique(&["- spacing off", "- wrong id"], None))
                .then_ok(critique(&["- spacing off", "- wrong id"], None))
                .then_ok(critique(&[], None)),
        );

        let result = run(&fx, backend.clone(), 3).await;

        assert_eq!(result.outcome, QaOutcome::Stagnated);
        assert_eq!(result.history.len(), 2);
        assert_eq!(result.iterations_run, 2);
        assert_eq!(backend.call_count(), 2);
        assert!(backend.calls()[1].prompt.contains("**Iteration 1:**\nIssues: - spacing off, - wrong id"));
    }

    #[tokio::test]
    async fn test_cap_reached_with_changing_issues() {
        let fx = Fixture::new();
        let fixed = json!({"layoutContainer": {"name": "Login v2"}, "items": []});
        let backend = Arc::new(
            ScriptedBackend::new()
                .then_ok(critique(&["a"], Some(&fixed)))
                .then_ok(critique(&["b"], None))
                .then_ok(critique(&["c"], None))
                .then_ok(critique(&[], None)),
        );

        let result = run(&fx, backend.clone(), 3).await;

        assert_eq!(result.outcome, QaOutcome::CapReached);
        assert_eq!(result.history.len(), 3);
        assert_eq!(result.corrected_json(), Some(&fixed));
        assert_eq!(backend.call_count(), 3);
        assert!(backend.calls()[1].prompt.contains("Login v2"));
    }

    #[tokio::test]
    async fn test_null_fixed_json_keeps_designer_layout() {
        let fx = Fixture::new();
        let backend = Arc::new(
            ScriptedBackend::new()
                .then_ok("---ISSUES-FOUND---\n- spacing\n---FIXED-JSON---\nnull")
                .then_ok("---ISSUES-FOUND---\n- padding\n---FIXED-JSON---\n42"),
        );

        let result = run(&fx, backend, 2).await;

        assert_eq!(result.outcome, QaOutcome::CapReached);
        assert!(!result.json_replaced);
        assert_eq!(result.json, Some(json!({"layoutContainer": {"name": "Login"}, "items": []})));
        assert_eq!(result.corrected_json(), None);
    }

    #[tokio::test]
    async fn test_cap_is_clamped() {
        let fx = Fixture::new();
        let backend = Arc::new(ScriptedBackend::new().with_responder(|inv| {
            let issue = format!("issue {}", inv.prompt.len());
            Ok(critique(&[issue.as_str()], None))
        }));

        let result = run(&fx, backend.clone(), 10).await;

        assert_eq!(result.outcome, QaOutcome::CapReached);
        assert_eq!(backend.call_count(), MAX_QA_ITERATIONS as usize);
    }

    #[tokio::test]
    async fn test_zero_iterations_disables_qa() {
        let fx = Fixture::new();
        let backend = Arc::new(ScriptedBackend::new());

        let result = run(&fx, backend.clone(), 0).await;

        assert_eq!(result.outcome, QaOutcome::Disabled);
        assert!(result.json.is_none());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unextractable_input_skips() {
        let fx = Fixture::new();
        let backend = Arc::new(ScriptedBackend::new());

        let result = fx
            .engine(backend.clone())
            .run(&run_id(), "just prose, no layout", "", 3, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.outcome, QaOutcome::Skipped);
        assert!(result.history.is_empty());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_keeps_pre_qa_json_and_partial_history() {
        let fx = Fixture::new();
        let fixed = json!({"layoutContainer": {}, "items": [{"type": "component"}]});
        let backend = Arc::new(
            ScriptedBackend::new()
                .then_ok(critique(&["a"], Some(&fixed)))
                .then_err(LlmError::ProviderOutage("503".to_string())),
        );

        let result = run(&fx, backend, 3).await;

        assert_eq!(result.outcome, QaOutcome::Failed);
        assert_eq!(result.json, Some(json!({"layoutContainer": {"name": "Login"}, "items": []})));
        assert_eq!(result.history.len(), 1);
        assert_eq!(result.iterations_run, 1);
        assert!(result.corrected_json().is_none());
        assert!(result.failure.as_deref().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_malformed_critique_fails_loop() {
        let fx = Fixture::new();
        let backend = Arc::new(ScriptedBackend::new().then_ok("I think it looks great."));

        let result = run(&fx, backend, 2).await;

        assert_eq!(result.outcome, QaOutcome::Failed);
        assert!(result.history.is_empty());
        assert!(result.failure.as_deref().unwrap().contains("ISSUES-FOUND"));
    }

    #[tokio::test]
    async fn test_missing_template_fails_loop() {
        let fx = Fixture::new();
        std::fs::remove_file(fx.root.join("prompts").join(QA_TEMPLATE)).unwrap();

        let result = run(&fx, Arc::new(ScriptedBackend::new()), 2).await;

        assert_eq!(result.outcome, QaOutcome::Failed);
        assert!(result.json.is_some());
    }

    #[tokio::test]
    async fn test_cancellation_is_an_error() {
        let fx = Fixture::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fx
            .engine(Arc::new(ScriptedBackend::new().then_ok(critique(&[], None))))
            .run(&run_id(), DESIGNER_OUTPUT, "", 2, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, QaError::Cancelled));
    }

    #[tokio::test]
    async fn test_artifacts_written_for_completed_loop() {
        let fx = Fixture::new();
        let backend = Arc::new(
            ScriptedBackend::new()
                .then_ok(critique(&["a"], None))
                .then_ok(critique(&[], None)),
        );
        let result = run(&fx, backend, 3).await;
        let store = ArtifactStore::new(fx.root.join("out"), fx.root.join("ready"), PipelineKind::Alt3);

        save_qa_artifacts(&store, &run_id(), &result).unwrap();

        let validated: Value = store
            .read_json(&store.qa_path(&run_id(), "validated"))
            .unwrap()
            .unwrap();
        assert_eq!(validated["layoutContainer"]["name"], "Login");
        let log: ChangeLog = store
            .read_json(&store.qa_path(&run_id(), "change_log"))
            .unwrap()
            .unwrap();
        assert_eq!(log.total_iterations, 1);
        assert!(fx.root.join("out/alt3_20250101_120000_2_5_qa_history.json").is_file());
    }

    #[test]
    fn test_outcome_names() {
        assert_eq!(QaOutcome::CapReached.to_string(), "cap_reached");
        assert_eq!(serde_json::to_value(QaOutcome::Stagnated).unwrap(), json!("stagnated"));
    }
}
