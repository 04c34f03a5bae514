//! Stage execution, Design QA and pipeline orchestration for uxpal
//!
//! The entry point is [`PipelineOrchestrator`]; the other modules are the
//! pieces it composes and are public so single steps can be driven directly.

pub mod artifacts;
pub mod design_system;
pub mod layout;
pub mod orchestrator;
pub mod pipeline;
pub mod qa;
pub mod review;
pub mod screenshot;
pub mod stage;

pub use artifacts::{ArtifactStore, StageRecord};
pub use layout::{LayoutReport, validate_layout};
pub use orchestrator::{
    ArtifactStatus, FinalArtifact, PipelineOrchestrator, RunOptions, RunSummary, StageRun,
    VisualOutcome,
};
pub use pipeline::{PipelineKind, StageDef};
pub use qa::{DesignQaEngine, QaOutcome, QaResult};
pub use stage::{StageContent, StageExecutor, StageResult};
