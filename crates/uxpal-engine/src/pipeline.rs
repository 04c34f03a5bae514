//! Built-in stage graphs
//!
//! A pipeline is an ordered list of [`StageDef`]s. Each definition names the
//! template file it loads, the label used in logs and file names, and how the
//! stage's input is bound into that template.

use serde::{Deserialize, Serialize};
use uxpal_utils::error::{ConfigError, StageError};

/// Template used by the Design QA critic.
pub const QA_TEMPLATE: &str = "alt2-5-design-qa.txt";

/// How a stage's input text is bound into its template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageInput {
    /// Only the legacy `[USER_INPUT]` slot.
    Legacy,
    /// Request-shaped stages: the input fills `{{USER_REQUEST}}`,
    /// `{{UX_UI_DESIGNER_OUTPUT}}` and `[USER_INPUT]`, plus `{{PLATFORM}}`.
    Request,
    /// The designer stage: analyzer output plus design-system data.
    Designer,
    /// Screenshot critique; input is two segments joined by the visual delimiter.
    VisualCritique,
    /// JSON engineering re-run over reviewer improvements.
    ReviewerJson,
}

/// One stage of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDef {
    pub index: u8,
    pub label: &'static str,
    pub template: &'static str,
    pub input: StageInput,
}

impl StageDef {
    const fn new(index: u8, label: &'static str, template: &'static str, input: StageInput) -> Self {
        Self {
            index,
            label,
            template,
            input,
        }
    }

    /// Label in `snake_case`, as used in artifact file names.
    ///
    /// ```rust
    /// use uxpal_engine::pipeline::PipelineKind;
    ///
    /// let stage = PipelineKind::Alt3.stage(2).unwrap();
    /// assert_eq!(stage.label_snake(), "ux_ui_designer");
    /// ```
    #[must_use]
    pub fn label_snake(&self) -> String {
        self.label.to_lowercase().replace(' ', "_")
    }
}

const ALT3_STAGES: [StageDef; 3] = [
    StageDef::new(1, "User Request Analyzer", "alt1-user-request-analyzer.txt", StageInput::Request),
    StageDef::new(2, "UX UI Designer", "alt2-ux-ui-designer.txt", StageInput::Designer),
    StageDef::new(3, "JSON Engineer", "5 json-engineer.txt", StageInput::Request),
];

const ALT3_VISUAL_STAGES: [StageDef; 2] = [
    StageDef::new(
        4,
        "Visual Improvement Analyzer",
        "visual-improvement-analyzer.txt",
        StageInput::VisualCritique,
    ),
    StageDef::new(
        5,
        "JSON Engineer Improved",
        "5 design-reviewer-json-engineer.txt",
        StageInput::ReviewerJson,
    ),
];

const CLASSIC_STAGES: [StageDef; 5] = [
    StageDef::new(1, "Product Manager", "1 product-manager.txt", StageInput::Legacy),
    StageDef::new(2, "Product Designer", "2 product-designer.txt", StageInput::Legacy),
    StageDef::new(3, "UX Designer", "3 ux-designer.txt", StageInput::Legacy),
    StageDef::new(4, "UI Designer", "4 ui-designer.txt", StageInput::Legacy),
    // Shares its template with alt3, so every input slot is bound.
    StageDef::new(5, "JSON Engineer", "5 json-engineer.txt", StageInput::Request),
];

/// The stage graphs uxpal knows how to run.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PipelineKind {
    /// Request analyzer, UX/UI designer, JSON engineer; supports QA and visual review.
    Alt3,
    /// Five role stages chained through `[USER_INPUT]`.
    Classic,
}

impl PipelineKind {
    /// Parse a configured pipeline name.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        name.parse().map_err(|_| ConfigError::InvalidValue {
            key: "pipeline".to_string(),
            value: name.to_string(),
        })
    }

    /// Stages run by `run-all-stages`, in order.
    #[must_use]
    pub fn stages(self) -> &'static [StageDef] {
        match self {
            Self::Alt3 => &ALT3_STAGES,
            Self::Classic => &CLASSIC_STAGES,
        }
    }

    /// Critique and re-engineering stages of the screenshot branch.
    ///
    /// Empty for pipelines without a visual branch.
    #[must_use]
    pub fn visual_stages(self) -> &'static [StageDef] {
        match self {
            Self::Alt3 => &ALT3_VISUAL_STAGES,
            Self::Classic => &[],
        }
    }

    #[must_use]
    pub fn supports_visual(self) -> bool {
        !self.visual_stages().is_empty()
    }

    /// Look up a stage by index, including visual stages.
    pub fn stage(self, index: u8) -> Result<&'static StageDef, StageError> {
        self.stages()
            .iter()
            .chain(self.visual_stages())
            .find(|def| def.index == index)
            .ok_or_else(|| StageError::UnknownStage {
                stage: index,
                pipeline: self.to_string(),
            })
    }

    /// The stage producing the layout the QA loop reviews.
    #[must_use]
    pub fn design_stage(self) -> u8 {
        match self {
            Self::Alt3 => 2,
            Self::Classic => 4,
        }
    }

    /// Last stage of the main line; its output becomes the ready artifact.
    #[must_use]
    pub fn final_stage(self) -> &'static StageDef {
        let stages = self.stages();
        &stages[stages.len() - 1]
    }

    /// Prefix of every artifact file name of this pipeline.
    #[must_use]
    pub fn file_prefix(self) -> &'static str {
        match self {
            Self::Alt3 => "alt3_",
            Self::Classic => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alt3_stage_graph() {
        let labels: Vec<_> = PipelineKind::Alt3.stages().iter().map(|s| s.label).collect();
        assert_eq!(labels, ["User Request Analyzer", "UX UI Designer", "JSON Engineer"]);
        assert_eq!(PipelineKind::Alt3.design_stage(), 2);
        assert_eq!(PipelineKind::Alt3.final_stage().index, 3);
        assert_eq!(PipelineKind::Alt3.stage(2).unwrap().input, StageInput::Designer);
    }

    #[test]
    fn test_visual_stages_are_addressable() {
        let critique = PipelineKind::Alt3.stage(4).unwrap();
        assert_eq!(critique.input, StageInput::VisualCritique);
        assert_eq!(critique.label_snake(), "visual_improvement_analyzer");
        assert_eq!(
            PipelineKind::Alt3.stage(5).unwrap().label_snake(),
            "json_engineer_improved"
        );
    }

    #[test]
    fn test_classic_role_stages() {
        let classic = PipelineKind::Classic;
        assert_eq!(classic.stages().len(), 5);
        assert!(classic.stages()[..4].iter().all(|s| s.input == StageInput::Legacy));
        assert_eq!(classic.final_stage().input, StageInput::Request);
        assert!(!classic.supports_visual());
        assert_eq!(classic.final_stage().template, "5 json-engineer.txt");
        assert_eq!(classic.file_prefix(), "");
    }

    #[test]
    fn test_unknown_stage() {
        let err = PipelineKind::Classic.stage(6).unwrap_err();
        assert!(matches!(err, StageError::UnknownStage { stage: 6, .. }));
        assert!(err.to_string().contains("classic"));
    }

    #[test]
    fn test_parse_pipeline_names() {
        assert_eq!(PipelineKind::parse("alt3").unwrap(), PipelineKind::Alt3);
        assert_eq!(PipelineKind::parse("classic").unwrap(), PipelineKind::Classic);
        assert!(PipelineKind::parse("alt4").is_err());
        assert_eq!(PipelineKind::Alt3.as_ref(), "alt3");
    }
}
