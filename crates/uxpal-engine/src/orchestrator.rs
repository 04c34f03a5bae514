//! End-to-end pipeline runs
//!
//! [`PipelineOrchestrator`] threads each stage's output into the next stage,
//! runs Design QA over the designer's layout, normalizes the last stage's
//! output into the ready artifact and, when enabled, runs the screenshot
//! branch. Each stage runs at most once per run; retries are a caller concern.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use uxpal_config::Config;
use uxpal_extraction::extract_json;
use uxpal_llm::LlmBackend;
use uxpal_prompt_template::TemplateStore;
use uxpal_utils::error::{StageError, UxpalError};
use uxpal_utils::logging::log_run_error;
use uxpal_utils::types::RunId;

use crate::artifacts::{ArtifactStore, RecordMode, StageRecord};
use crate::design_system::{DesignSystemData, DesignSystemLoader};
use crate::layout::{LayoutReport, validate_layout};
use crate::pipeline::{PipelineKind, StageInput};
use crate::qa::{DesignQaEngine, QaError, QaOutcome, QaResult, qa_envelope, save_qa_artifacts};
use crate::review::{self, ReviewVerdict};
use crate::screenshot::{ScreenshotHandoff, WaitOutcome};
use crate::stage::{StageContent, StageExecutor, StageExtras, StageMetadata, StageResult};

/// Per-run overrides of the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Generated from the clock when absent.
    pub run_id: Option<RunId>,
    pub qa_iterations: Option<u32>,
    pub visual: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: u8,
    pub stage_name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: StageMetadata,
}

impl From<&StageResult> for StageSummary {
    fn from(result: &StageResult) -> Self {
        Self {
            stage: result.stage,
            stage_name: result.metadata.stage_label.clone(),
            status: result.content.status().to_string(),
            error: match &result.content {
                StageContent::Failed { error } => Some(error.clone()),
                StageContent::Ok(_) => None,
            },
            metadata: result.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaSummary {
    pub outcome: QaOutcome,
    pub iterations_run: u32,
    pub issues_found: usize,
    pub json_replaced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl QaSummary {
    fn disabled() -> Self {
        Self {
            outcome: QaOutcome::Disabled,
            iterations_run: 0,
            issues_found: 0,
            json_replaced: false,
            failure: None,
        }
    }
}

impl From<&QaResult> for QaSummary {
    fn from(result: &QaResult) -> Self {
        Self {
            outcome: result.outcome,
            iterations_run: result.iterations_run,
            issues_found: result.history.iter().map(|r| r.issues.len()).sum(),
            json_replaced: result.json_replaced,
            failure: result.failure.clone(),
        }
    }
}

/// How the screenshot branch of a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VisualOutcome {
    /// Not requested for this run.
    Disabled,
    /// The pipeline has no visual stages.
    Unsupported,
    /// There was no valid ready artifact to render.
    NoArtifact,
    /// No screenshot arrived in time; the ready artifact stands.
    TimedOut,
    Approved,
    /// The critique could not be used; the ready artifact stands.
    Unusable { reason: String },
    Improved { path: String },
    /// The re-engineered output held no JSON; the ready artifact stands.
    ImprovedInvalid { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Valid,
    Invalid,
}

/// The normalized output of a run's last main-line stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalArtifact {
    pub status: ArtifactStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutReport>,
}

impl FinalArtifact {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status == ArtifactStatus::Valid
    }
}

/// Everything a run produced, persisted as `{prefix}{run_id}_summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub pipeline: PipelineKind,
    pub run_id: String,
    pub initial_input: String,
    pub timestamp: String,
    pub total_stages: usize,
    pub ai_enabled: bool,
    pub stages: Vec<StageSummary>,
    pub qa: QaSummary,
    pub visual: VisualOutcome,
    pub final_artifact: FinalArtifact,
}

/// A single stage run on request.
#[derive(Debug, Clone)]
pub struct StageRun {
    pub result: StageResult,
    /// Set when the stage is the last of its line.
    pub final_artifact: Option<FinalArtifact>,
}

/// Result of the screenshot branch together with the stages it ran.
struct VisualRun {
    outcome: VisualOutcome,
    stages: Vec<StageResult>,
}

pub struct PipelineOrchestrator {
    pipeline: PipelineKind,
    executor: StageExecutor,
    qa: DesignQaEngine,
    design_system: DesignSystemLoader,
    handoff: ScreenshotHandoff,
    qa_iterations: u32,
    visual: bool,
    cancel: CancellationToken,
}

impl PipelineOrchestrator {
    /// Build an orchestrator for `config` around an existing backend.
    pub fn new(config: &Config, backend: Arc<dyn LlmBackend>) -> Result<Self> {
        let pipeline = PipelineKind::parse(config.pipeline()).map_err(UxpalError::Config)?;
        let templates = TemplateStore::new(config.prompts_dir());
        let executor = StageExecutor::new(
            backend.clone(),
            templates.clone(),
            ArtifactStore::from_config(config, pipeline),
            config.llm_model(),
            config.platform(),
            config.stage_timeout(),
        );
        let qa = DesignQaEngine::new(backend, templates, config.llm_model(), config.stage_timeout());

        Ok(Self {
            pipeline,
            executor,
            qa,
            design_system: DesignSystemLoader::new(config.design_system_dir())?,
            handoff: ScreenshotHandoff::from_config(config),
            qa_iterations: config.qa_max_iterations(),
            visual: config.screenshot_enabled(),
            cancel: CancellationToken::new(),
        })
    }

    /// Build an orchestrator with the backend `config` selects.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = uxpal_llm::from_config(config).map_err(UxpalError::Llm)?;
        Self::new(config, backend)
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts the current run when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Use caller-supplied design-system data instead of scanning the directory.
    #[must_use]
    pub fn with_design_system_data(mut self, data: Value) -> Self {
        self.design_system = self.design_system.with_in_memory(data);
        self
    }

    #[must_use]
    pub fn with_screenshot_timeout(mut self, timeout: Duration) -> Self {
        self.handoff = self.handoff.with_timeout(timeout);
        self
    }

    #[must_use]
    pub fn pipeline(&self) -> PipelineKind {
        self.pipeline
    }

    #[must_use]
    pub fn store(&self) -> &ArtifactStore {
        self.executor.store()
    }

    #[must_use]
    pub fn handoff(&self) -> &ScreenshotHandoff {
        &self.handoff
    }

    /// Run every stage for `input` and write the run summary.
    ///
    /// # Errors
    ///
    /// Fails on cancellation, a missing template or a filesystem failure.
    /// Provider failures, QA failures, an unparseable final output and a
    /// missing screenshot are recorded in the summary instead.
    pub async fn run_all(&self, input: &str, options: RunOptions) -> Result<RunSummary> {
        let run_id = options.run_id.clone().unwrap_or_else(RunId::generate);
        let span = info_span!("pipeline_run", run_id = %run_id, pipeline = %self.pipeline);
        let outcome = self
            .run_all_inner(&run_id, input, &options)
            .instrument(span)
            .await;
        if let Err(e) = &outcome {
            log_run_error(run_id.as_str(), &format!("{e:#}"));
        }
        outcome
    }

    async fn run_all_inner(
        &self,
        run_id: &RunId,
        input: &str,
        options: &RunOptions,
    ) -> Result<RunSummary> {
        let qa_iterations = options.qa_iterations.unwrap_or(self.qa_iterations);
        let visual = options.visual.unwrap_or(self.visual);
        info!(
            input_chars = input.chars().count(),
            qa_iterations,
            visual,
            ai_enabled = self.executor.backend().uses_model(),
            "Starting pipeline run"
        );

        let design_system = self.design_system.load();
        let mut current = input.to_string();
        let mut results: Vec<StageResult> = Vec::new();
        let mut qa = QaSummary::disabled();

        for def in self.pipeline.stages() {
            let result = self
                .executor
                .run_stage(def, &current, run_id, extras(&design_system), &self.cancel)
                .await?;
            current = result.content.text().into_owned();
            results.push(result);

            if def.index == self.pipeline.design_stage() {
                let qa_result = self
                    .run_qa_over(run_id, &current, &design_system.text, qa_iterations)
                    .await?;
                if let Some(json) = qa_result.corrected_json() {
                    info!("Passing the QA-corrected layout to the next stage");
                    current = qa_envelope(json, &qa_result.history);
                }
                qa = QaSummary::from(&qa_result);
            }
        }

        let (final_artifact, final_json) = self.finalize(run_id, &current, false)?;

        let visual_outcome = if !visual {
            VisualOutcome::Disabled
        } else if !self.pipeline.supports_visual() {
            VisualOutcome::Unsupported
        } else if let Some(json) = &final_json {
            let visual_run = self
                .visual_branch(
                    run_id,
                    &results[0].content.text(),
                    &results[1].content.text(),
                    json,
                    &design_system,
                    RecordMode::CreateNew,
                )
                .await?;
            results.extend(visual_run.stages);
            visual_run.outcome
        } else {
            VisualOutcome::NoArtifact
        };

        let summary = RunSummary {
            pipeline: self.pipeline,
            run_id: run_id.to_string(),
            initial_input: input.to_string(),
            timestamp: chrono::Local::now().to_rfc3339(),
            total_stages: results.len(),
            ai_enabled: self.executor.backend().uses_model(),
            stages: results.iter().map(StageSummary::from).collect(),
            qa,
            visual: visual_outcome,
            final_artifact,
        };
        let path = self.store().summary_path(run_id);
        self.store()
            .write_json(&path, &summary)
            .with_context(|| format!("Failed to write run summary {path}"))?;
        info!(
            final_valid = summary.final_artifact.is_valid(),
            stages = summary.total_stages,
            summary = %path,
            "Pipeline run complete"
        );
        Ok(summary)
    }

    /// Run one stage of an existing run, reading its input from the
    /// artifacts of earlier stages.
    ///
    /// # Errors
    ///
    /// `StageError::MissingDependency` when the upstream record is absent,
    /// `StageError::MissingArtifact` when the visual stages lack their
    /// screenshot or critique, and `StageError::MissingInput` for stage 1
    /// without `input`.
    pub async fn run_single_stage(
        &self,
        stage: u8,
        run_id: &RunId,
        input: Option<&str>,
    ) -> Result<StageRun> {
        let def = self.pipeline.stage(stage).map_err(UxpalError::Stage)?;
        let design_system = self.design_system.load();
        let store = self.store();
        let mut extras = extras(&design_system);
        extras.record_mode = RecordMode::Replace;

        let stage_input = match def.input {
            _ if def.index == 1 => input
                .map(str::to_string)
                .ok_or_else(|| {
                    UxpalError::Stage(StageError::MissingInput {
                        stage: 1,
                        reason: "stage 1 takes the request text as input".to_string(),
                    })
                })?,
            StageInput::VisualCritique => {
                let (analyzer, designer) = self.visual_sources(run_id, stage)?;
                let path = self.handoff.screenshot_path(run_id);
                if !path.is_file() {
                    return Err(missing_artifact(run_id, format!("screenshot at {path}")));
                }
                extras.screenshot = Some(self.handoff.consume_screenshot(run_id)?);
                extras.bindings = review::critique_bindings(&analyzer.content, &designer.content);
                review::visual_input(&analyzer.content, &designer.content)
            }
            StageInput::ReviewerJson => {
                let critique_def = self.pipeline.stage(stage - 1).map_err(UxpalError::Stage)?;
                let critique = store.require_stage(run_id, stage, critique_def)?;
                match review::classify(&critique.content) {
                    ReviewVerdict::Improved { json } if !critique.is_failed() => {
                        review::reviewer_envelope(&json)
                    }
                    _ => {
                        return Err(missing_artifact(
                            run_id,
                            "improved JSON from the visual critique".to_string(),
                        ));
                    }
                }
            }
            _ => {
                let previous = self.pipeline.stage(stage - 1).map_err(UxpalError::Stage)?;
                store.require_stage(run_id, stage, previous)?.content
            }
        };

        let result = self
            .executor
            .run_stage(def, &stage_input, run_id, extras, &self.cancel)
            .await?;

        let final_artifact = if def.index == self.pipeline.final_stage().index {
            Some(self.finalize(run_id, &result.content.text(), false)?.0)
        } else if def.input == StageInput::ReviewerJson {
            Some(self.finalize(run_id, &result.content.text(), true)?.0)
        } else {
            None
        };

        Ok(StageRun {
            result,
            final_artifact,
        })
    }

    /// Run Design QA over the design stage output of an existing run.
    ///
    /// `iterations` defaults to the configured cap.
    pub async fn run_qa_for_run(&self, run_id: &RunId, iterations: Option<u32>) -> Result<QaResult> {
        let def = self
            .pipeline
            .stage(self.pipeline.design_stage())
            .map_err(UxpalError::Stage)?;
        let record = self.store().load_stage(run_id, def)?.ok_or_else(|| {
            missing_artifact(run_id, format!("stage {} ({}) output", def.index, def.label))
        })?;
        let design_system = self.design_system.load();
        self.run_qa_over(
            run_id,
            &record.content,
            &design_system.text,
            iterations.unwrap_or(self.qa_iterations),
        )
        .await
    }

    /// Run the screenshot branch for a run whose ready artifact exists.
    ///
    /// Updates the run summary when one was written.
    pub async fn run_visual(&self, run_id: &RunId) -> Result<VisualOutcome> {
        if !self.pipeline.supports_visual() {
            return Ok(VisualOutcome::Unsupported);
        }
        let critique_stage = self.pipeline.visual_stages()[0].index;
        let (analyzer, designer) = self.visual_sources(run_id, critique_stage)?;
        let ready = self.store().ready_path(run_id, false);
        let json: Value = self
            .store()
            .read_json(&ready)?
            .ok_or_else(|| missing_artifact(run_id, format!("final artifact at {ready}")))?;

        let design_system = self.design_system.load();
        let visual_run = self
            .visual_branch(
                run_id,
                &analyzer.content,
                &designer.content,
                &json,
                &design_system,
                RecordMode::Replace,
            )
            .await?;

        let summary_path = self.store().summary_path(run_id);
        if let Some(mut summary) = self.store().read_json::<RunSummary>(&summary_path)? {
            summary.stages.extend(visual_run.stages.iter().map(StageSummary::from));
            summary.total_stages = summary.stages.len();
            summary.visual = visual_run.outcome.clone();
            self.store().write_json(&summary_path, &summary)?;
        }
        Ok(visual_run.outcome)
    }

    async fn run_qa_over(
        &self,
        run_id: &RunId,
        designer_output: &str,
        design_system: &str,
        iterations: u32,
    ) -> Result<QaResult> {
        let result = self
            .qa
            .run(run_id, designer_output, design_system, iterations, &self.cancel)
            .await
            .map_err(|e| -> anyhow::Error {
                match e {
                    QaError::Cancelled => UxpalError::Cancelled {
                        run_id: run_id.to_string(),
                    }
                    .into(),
                    other => other.into(),
                }
            })?;
        save_qa_artifacts(self.store(), run_id, &result)
            .with_context(|| format!("Failed to write QA artifacts for run {run_id}"))?;
        info!(
            outcome = %result.outcome,
            iterations_run = result.iterations_run,
            "Design QA finished"
        );
        Ok(result)
    }

    /// Normalize `text` into a ready artifact. Unparseable text leaves the
    /// ready location untouched and reports the artifact as invalid.
    fn finalize(
        &self,
        run_id: &RunId,
        text: &str,
        improved: bool,
    ) -> Result<(FinalArtifact, Option<Value>)> {
        match extract_json(text) {
            Ok(json) => {
                let path = self.store().ready_path(run_id, improved);
                self.store()
                    .write_json(&path, &json)
                    .with_context(|| format!("Failed to write ready artifact {path}"))?;
                let layout = validate_layout(&json);
                if !layout.is_valid() {
                    warn!(
                        issues = layout.issues().count(),
                        "Ready artifact has layout issues"
                    );
                }
                info!(path = %path, "Wrote ready artifact");
                Ok((
                    FinalArtifact {
                        status: ArtifactStatus::Valid,
                        path: Some(path.to_string()),
                        reason: None,
                        layout: Some(layout),
                    },
                    Some(json),
                ))
            }
            Err(e) => {
                warn!(error = %e, "Final stage output holds no JSON; stage files are kept for inspection");
                Ok((
                    FinalArtifact {
                        status: ArtifactStatus::Invalid,
                        path: None,
                        reason: Some(e.to_string()),
                        layout: None,
                    },
                    None,
                ))
            }
        }
    }

    async fn visual_branch(
        &self,
        run_id: &RunId,
        analyzer: &str,
        designer: &str,
        json: &Value,
        design_system: &DesignSystemData,
        record_mode: RecordMode,
    ) -> Result<VisualRun> {
        let [critique_def, reviewer_def] = self.pipeline.visual_stages() else {
            return Ok(VisualRun {
                outcome: VisualOutcome::Unsupported,
                stages: Vec::new(),
            });
        };

        self.handoff.create_request(run_id, json)?;
        match self.handoff.wait_for_screenshot(run_id, &self.cancel).await {
            WaitOutcome::Ready(_) => {}
            WaitOutcome::TimedOut => {
                return Ok(VisualRun {
                    outcome: VisualOutcome::TimedOut,
                    stages: Vec::new(),
                });
            }
            WaitOutcome::Cancelled => {
                return Err(UxpalError::Cancelled {
                    run_id: run_id.to_string(),
                }
                .into());
            }
        }
        let image = match self.handoff.consume_screenshot(run_id) {
            Ok(image) => image,
            Err(e) => {
                warn!(error = %e, "Screenshot unreadable; skipping visual review");
                return Ok(VisualRun {
                    outcome: VisualOutcome::Unusable {
                        reason: format!("{e:#}"),
                    },
                    stages: Vec::new(),
                });
            }
        };
        self.handoff.complete_request(run_id)?;

        let critique_extras = StageExtras {
            screenshot: Some(image),
            bindings: review::critique_bindings(analyzer, designer),
            record_mode,
            ..extras(design_system)
        };
        let critique = self
            .executor
            .run_stage(
                critique_def,
                &review::visual_input(analyzer, designer),
                run_id,
                critique_extras,
                &self.cancel,
            )
            .await?;

        let verdict = match &critique.content {
            StageContent::Failed { error } => ReviewVerdict::Unusable {
                reason: error.clone(),
            },
            StageContent::Ok(text) => review::classify(text),
        };
        let mut stages = vec![critique];

        let outcome = match verdict {
            ReviewVerdict::Approved => {
                info!("Visual review approved the rendered design");
                VisualOutcome::Approved
            }
            ReviewVerdict::Unusable { reason } => {
                warn!(reason = %reason, "Visual critique unusable; keeping the ready artifact");
                VisualOutcome::Unusable { reason }
            }
            ReviewVerdict::Improved { json } => {
                let reviewer = self
                    .executor
                    .run_stage(
                        reviewer_def,
                        &review::reviewer_envelope(&json),
                        run_id,
                        StageExtras {
                            record_mode,
                            ..extras(design_system)
                        },
                        &self.cancel,
                    )
                    .await?;
                let (artifact, _) = self.finalize(run_id, &reviewer.content.text(), true)?;
                stages.push(reviewer);
                match artifact {
                    FinalArtifact {
                        status: ArtifactStatus::Valid,
                        path: Some(path),
                        ..
                    } => VisualOutcome::Improved { path },
                    FinalArtifact { reason, .. } => VisualOutcome::ImprovedInvalid {
                        reason: reason.unwrap_or_default(),
                    },
                }
            }
        };

        Ok(VisualRun { outcome, stages })
    }

    /// Records of the stages feeding the visual critique.
    fn visual_sources(&self, run_id: &RunId, stage: u8) -> Result<(StageRecord, StageRecord)> {
        let analyzer_def = self.pipeline.stage(1).map_err(UxpalError::Stage)?;
        let designer_def = self
            .pipeline
            .stage(self.pipeline.design_stage())
            .map_err(UxpalError::Stage)?;
        Ok((
            self.store().require_stage(run_id, stage, analyzer_def)?,
            self.store().require_stage(run_id, stage, designer_def)?,
        ))
    }
}

fn extras(design_system: &DesignSystemData) -> StageExtras {
    StageExtras {
        design_system: Some(design_system.text.clone()),
        ..StageExtras::default()
    }
}

fn missing_artifact(run_id: &RunId, artifact: String) -> anyhow::Error {
    UxpalError::Stage(StageError::MissingArtifact {
        artifact,
        run_id: run_id.to_string(),
    })
    .into()
}
