//! Run artifacts on disk
//!
//! Every file of a run is named from the pipeline prefix, the run id and the
//! stage index, so concurrent runs never share a file. Stage records of a
//! pipeline run are created once through an atomic rename and never revised;
//! only an explicit single-stage re-run may replace them.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use uxpal_config::Config;
use uxpal_utils::atomic_write::{
    create_bytes_atomic, create_json_atomic, is_already_exists, write_bytes_atomic,
    write_json_atomic,
};
use uxpal_utils::error::{StageError, UxpalError};
use uxpal_utils::types::RunId;

use crate::pipeline::{PipelineKind, StageDef};
use crate::stage::{StageContent, StageMetadata, StageResult};

/// What saving a stage does when its record is already on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordMode {
    /// Refuse with `StageError::OutputExists`.
    #[default]
    CreateNew,
    /// Replace the earlier record; used by explicit re-runs.
    Replace,
}

/// Persisted form of a [`StageResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub pipeline: String,
    pub stage: u8,
    pub stage_name: String,
    pub timestamp: String,
    /// Text handed to the next stage; the failure marker for failed stages.
    pub content: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: StageMetadata,
    pub content_blake3: String,
}

impl StageRecord {
    fn from_result(pipeline: PipelineKind, def: &StageDef, result: &StageResult) -> Self {
        let content = result.content.text().into_owned();
        let error = match &result.content {
            StageContent::Failed { error } => Some(error.clone()),
            StageContent::Ok(_) => None,
        };
        Self {
            pipeline: pipeline.to_string(),
            stage: def.index,
            stage_name: def.label.to_string(),
            timestamp: chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
            content_blake3: content_hash(&content),
            content,
            status: result.content.status().to_string(),
            error,
            metadata: result.metadata.clone(),
        }
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.status == "failed"
    }

    /// Rebuild the in-memory result.
    #[must_use]
    pub fn to_result(&self) -> StageResult {
        let content = match &self.error {
            Some(error) if self.is_failed() => StageContent::Failed {
                error: error.clone(),
            },
            _ => StageContent::Ok(self.content.clone()),
        };
        StageResult {
            stage: self.stage,
            content,
            metadata: self.metadata.clone(),
        }
    }
}

fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// File layout of one pipeline's runs.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: Utf8PathBuf,
    ready_dir: Utf8PathBuf,
    pipeline: PipelineKind,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(
        output_dir: impl Into<Utf8PathBuf>,
        ready_dir: impl Into<Utf8PathBuf>,
        pipeline: PipelineKind,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            ready_dir: ready_dir.into(),
            pipeline,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config, pipeline: PipelineKind) -> Self {
        Self::new(config.output_dir(), config.ready_dir(), pipeline)
    }

    #[must_use]
    pub fn pipeline(&self) -> PipelineKind {
        self.pipeline
    }

    #[must_use]
    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    fn run_file(&self, run_id: &RunId, suffix: &str) -> Utf8PathBuf {
        self.output_dir.join(format!(
            "{}{}_{suffix}",
            self.pipeline.file_prefix(),
            run_id
        ))
    }

    /// `{prefix}{run_id}_{stage}_{label_snake}.json`
    #[must_use]
    pub fn stage_record_path(&self, run_id: &RunId, def: &StageDef) -> Utf8PathBuf {
        self.run_file(run_id, &format!("{}_{}.json", def.index, def.label_snake()))
    }

    /// `{prefix}{run_id}_{stage}_{label_snake}_output.txt`
    #[must_use]
    pub fn stage_text_path(&self, run_id: &RunId, def: &StageDef) -> Utf8PathBuf {
        self.run_file(run_id, &format!("{}_{}_output.txt", def.index, def.label_snake()))
    }

    /// QA file for the design stage, e.g. `alt3_{run_id}_2_5_qa_history.json`.
    #[must_use]
    pub fn qa_path(&self, run_id: &RunId, name: &str) -> Utf8PathBuf {
        self.run_file(
            run_id,
            &format!("{}_5_qa_{name}.json", self.pipeline.design_stage()),
        )
    }

    #[must_use]
    pub fn summary_path(&self, run_id: &RunId) -> Utf8PathBuf {
        self.run_file(run_id, "summary.json")
    }

    /// Ready artifact of a run; `improved` selects the visual-review variant.
    #[must_use]
    pub fn ready_path(&self, run_id: &RunId, improved: bool) -> Utf8PathBuf {
        let name = if improved {
            format!("figma_ready_improved_{run_id}.json")
        } else {
            format!("figma_ready_{run_id}.json")
        };
        self.ready_dir.join(name)
    }

    /// Write the record and the raw text of a stage result.
    ///
    /// The text file holds the content byte for byte.
    pub fn save_stage(
        &self,
        run_id: &RunId,
        def: &StageDef,
        result: &StageResult,
        mode: RecordMode,
    ) -> Result<()> {
        let record = StageRecord::from_result(self.pipeline, def, result);
        let record_path = self.stage_record_path(run_id, def);
        let text_path = self.stage_text_path(run_id, def);

        let persist = |path: &Utf8Path, written: Result<()>| -> Result<()> {
            written.map_err(|e| {
                if is_already_exists(&e) {
                    UxpalError::Stage(StageError::OutputExists {
                        stage: def.index,
                        path: path.to_string(),
                        run_id: run_id.to_string(),
                    })
                    .into()
                } else {
                    anyhow::Error::from(StageError::PersistFailed {
                        stage: def.index,
                        reason: format!("{path}: {e:#}"),
                    })
                }
            })
        };

        match mode {
            RecordMode::CreateNew => {
                persist(&record_path, create_json_atomic(&record_path, &record))?;
                persist(&text_path, create_bytes_atomic(&text_path, record.content.as_bytes()))?;
            }
            RecordMode::Replace => {
                persist(&record_path, write_json_atomic(&record_path, &record))?;
                persist(&text_path, write_bytes_atomic(&text_path, record.content.as_bytes()))?;
            }
        }

        debug!(record = %record_path, text = %text_path, ?mode, "Saved stage output");
        Ok(())
    }

    /// Load a stage record, `None` if the stage never ran for this run.
    pub fn load_stage(&self, run_id: &RunId, def: &StageDef) -> Result<Option<StageRecord>> {
        let path = self.stage_record_path(run_id, def);
        let Some(record) = self.read_json::<StageRecord>(&path)? else {
            return Ok(None);
        };
        if content_hash(&record.content) != record.content_blake3 {
            warn!(path = %path, "Stage record content does not match its recorded hash");
        }
        Ok(Some(record))
    }

    /// Load the record `stage` depends on, failing with `MissingDependency`.
    pub fn require_stage(
        &self,
        run_id: &RunId,
        stage: u8,
        dependency: &StageDef,
    ) -> Result<StageRecord> {
        self.load_stage(run_id, dependency)?.ok_or_else(|| {
            UxpalError::Stage(StageError::MissingDependency {
                stage,
                dependency: dependency.index,
                run_id: run_id.to_string(),
            })
            .into()
        })
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, path: &Utf8Path, value: &T) -> Result<()> {
        write_json_atomic(path, value)
    }

    /// Read a JSON file, `None` if it does not exist.
    pub fn read_json<T: DeserializeOwned>(&self, path: &Utf8Path) -> Result<Option<T>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {path}")),
        };
        let value =
            serde_json::from_str(&text).with_context(|| format!("Failed to parse {path}"))?;
        Ok(Some(value))
    }
}
