//! Single-stage execution
//!
//! [`StageExecutor::run_stage`] loads a template, composes the prompt, calls
//! the backend under the stage timeout and persists the result. Provider
//! failures do not abort the run: they come back as [`StageContent::Failed`]
//! and the next stage receives the failure marker as its input.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug};

use uxpal_llm::{ImageInput, LlmBackend, LlmError, LlmInvocation};
use uxpal_prompt_template::{
    Placeholder, PromptBindings, TemplateError, TemplateStore, compose, unresolved_tokens,
};
use uxpal_utils::error::{StageError, UxpalError};
use uxpal_utils::logging::{log_stage_complete, log_stage_degraded, log_stage_start, stage_span};
use uxpal_utils::types::{RunId, TokenUsage};

use crate::artifacts::{ArtifactStore, RecordMode};
use crate::design_system::NO_DESIGN_SYSTEM;
use crate::pipeline::{StageDef, StageInput};
use crate::review;

/// Opening of the text a failed stage hands to the next stage.
pub const FAILURE_MARKER: &str = "[ERROR - AI call failed";

/// What a stage produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageContent {
    /// Raw model output.
    Ok(String),
    /// The provider call failed; `error` is the provider's message.
    Failed { error: String },
}

impl StageContent {
    /// Text flowing into the next stage.
    ///
    /// ```rust
    /// use uxpal_engine::stage::StageContent;
    ///
    /// let failed = StageContent::Failed { error: "quota".to_string() };
    /// assert_eq!(failed.text(), "[ERROR - AI call failed: quota]");
    /// ```
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Self::Ok(text) => Cow::Borrowed(text),
            Self::Failed { error } => Cow::Owned(format!("{FAILURE_MARKER}: {error}]")),
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    #[must_use]
    pub fn status(&self) -> &'static str {
        match self {
            Self::Ok(_) => "ok",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Timing and accounting for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMetadata {
    pub stage_label: String,
    /// False when the placeholder backend answered.
    pub used_model: bool,
    /// Length of the template text in characters.
    pub prompt_length: usize,
    pub execution_time_seconds: f64,
    /// Provider-reported counts when available, otherwise an estimate.
    pub token_usage: Option<TokenUsage>,
    #[serde(default)]
    pub provider: String,
}

/// Output of one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageResult {
    pub stage: u8,
    pub content: StageContent,
    pub metadata: StageMetadata,
}

/// Additional context some stages need besides their input, and how the
/// result is persisted.
#[derive(Debug, Clone, Default)]
pub struct StageExtras {
    /// Design-system text; the fallback literal is bound when absent.
    pub design_system: Option<String>,
    /// Screenshot for the visual critique.
    pub screenshot: Option<ImageInput>,
    /// Extra bindings applied last, overriding the stage's own.
    pub bindings: PromptBindings,
    pub record_mode: RecordMode,
}

/// Runs individual stages against one backend.
pub struct StageExecutor {
    backend: Arc<dyn LlmBackend>,
    templates: TemplateStore,
    store: ArtifactStore,
    model: String,
    platform: String,
    timeout: Duration,
}

impl StageExecutor {
    #[must_use]
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        templates: TemplateStore,
        store: ArtifactStore,
        model: impl Into<String>,
        platform: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            templates,
            store,
            model: model.into(),
            platform: platform.into(),
            timeout,
        }
    }

    #[must_use]
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn LlmBackend> {
        &self.backend
    }

    /// Run `def` over `input` and persist both artifacts before returning.
    ///
    /// # Errors
    ///
    /// Fails for a missing template, a persistence failure or cancellation.
    /// A failing provider call is *not* an error.
    pub async fn run_stage(
        &self,
        def: &StageDef,
        input: &str,
        run_id: &RunId,
        extras: StageExtras,
        cancel: &CancellationToken,
    ) -> Result<StageResult> {
        let span = stage_span(run_id.as_str(), def.index, def.label);
        self.run_stage_inner(def, input, run_id, extras, cancel)
            .instrument(span)
            .await
    }

    async fn run_stage_inner(
        &self,
        def: &StageDef,
        input: &str,
        run_id: &RunId,
        extras: StageExtras,
        cancel: &CancellationToken,
    ) -> Result<StageResult> {
        log_stage_start(run_id.as_str(), def.index, def.label, input.chars().count());
        let started = Instant::now();

        let template = self.templates.load(def.template).map_err(|e| match e {
            TemplateError::NotFound { path } => UxpalError::Stage(StageError::TemplateNotFound {
                stage: def.index,
                path: path.to_string(),
            }),
            TemplateError::Read { path, source } => UxpalError::Stage(StageError::MissingInput {
                stage: def.index,
                reason: format!("cannot read template {path}: {source}"),
            }),
        })?;

        let bindings = self.bindings_for(def, input, &extras);
        let prompt = if def.input == StageInput::ReviewerJson {
            review::compose_with_reviewer_output(&template, &bindings)
        } else {
            compose(&template, &bindings)
        };
        debug!(prompt_chars = prompt.len(), "Composed stage prompt");
        let unresolved = unresolved_tokens(&template, &bindings);
        if !unresolved.is_empty() {
            let (known, other): (Vec<&str>, Vec<&str>) = unresolved
                .into_iter()
                .partition(|token| Placeholder::from_token(token).is_some());
            debug!(?known, ?other, "Template tokens left unbound");
        }

        let mut invocation = LlmInvocation::new(
            run_id.as_str(),
            def.label,
            self.model.clone(),
            self.timeout,
            prompt.clone(),
        );
        if let Some(image) = extras.screenshot {
            invocation = invocation.with_image(image);
        }

        let call = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(LlmError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, self.backend.invoke(invocation)) => {
                outcome.unwrap_or(Err(LlmError::Timeout { duration: self.timeout }))
            }
        };

        let elapsed = started.elapsed();
        let (content, token_usage) = match call {
            Ok(result) => {
                let usage = match (result.tokens_input, result.tokens_output) {
                    (Some(p), Some(c)) => Some(TokenUsage::reported(p, c)),
                    _ if self.backend.uses_model() => {
                        Some(TokenUsage::estimate(&prompt, &result.raw_response))
                    }
                    _ => None,
                };
                (StageContent::Ok(result.raw_response), usage)
            }
            Err(LlmError::Cancelled) => {
                return Err(UxpalError::Cancelled {
                    run_id: run_id.to_string(),
                }
                .into());
            }
            Err(err) => {
                log_stage_degraded(
                    run_id.as_str(),
                    def.index,
                    &err.to_string(),
                    elapsed.as_millis(),
                );
                (
                    StageContent::Failed {
                        error: err.to_string(),
                    },
                    None,
                )
            }
        };

        let result = StageResult {
            stage: def.index,
            metadata: StageMetadata {
                stage_label: def.label.to_string(),
                used_model: self.backend.uses_model(),
                prompt_length: template.chars().count(),
                execution_time_seconds: elapsed.as_secs_f64(),
                token_usage,
                provider: self.backend.provider_name().to_string(),
            },
            content,
        };

        self.store
            .save_stage(run_id, def, &result, extras.record_mode)
            .with_context(|| format!("Failed to persist stage {} output", def.index))?;
        log_stage_complete(
            run_id.as_str(),
            def.index,
            elapsed.as_millis(),
            result.content.text().chars().count(),
        );
        Ok(result)
    }

    fn bindings_for(&self, def: &StageDef, input: &str, extras: &StageExtras) -> PromptBindings {
        let design_system = extras.design_system.as_deref().unwrap_or(NO_DESIGN_SYSTEM);
        let mut bindings = PromptBindings::new();
        match def.input {
            StageInput::Legacy => {
                bindings.bind(Placeholder::UserInput, input);
            }
            StageInput::Request => {
                bindings
                    .bind(Placeholder::UserRequest, input)
                    .bind(Placeholder::Platform, self.platform.as_str())
                    .bind(Placeholder::UxUiDesignerOutput, input)
                    .bind(Placeholder::UserInput, input);
            }
            StageInput::Designer => {
                bindings
                    .bind(Placeholder::UserRequestAnalyzerOutput, input)
                    .bind(Placeholder::DesignSystemData, design_system)
                    .bind(Placeholder::Platform, self.platform.as_str());
            }
            StageInput::VisualCritique => {
                // `extras.bindings` from `review::critique_bindings` override
                // this split.
                let (analyzer, designer) = review::split_visual_input(input);
                bindings
                    .bind(Placeholder::AnalyzerOutput, review::excerpt(analyzer))
                    .bind(Placeholder::DesignerOutput, review::excerpt(designer))
                    .bind(Placeholder::DesignSystemData, design_system)
                    .bind(Placeholder::Platform, self.platform.as_str())
                    .bind(
                        Placeholder::InterfaceImage,
                        if extras.screenshot.is_some() {
                            review::SCREENSHOT_ATTACHED
                        } else {
                            review::SCREENSHOT_MISSING
                        },
                    );
            }
            StageInput::ReviewerJson => {
                bindings
                    .bind(Placeholder::ReviewerOutput, input)
                    .bind(Placeholder::DesignSystemData, design_system)
                    .bind(Placeholder::Platform, self.platform.as_str());
            }
        }
        bindings.merge(&extras.bindings);
        bindings
    }
}
