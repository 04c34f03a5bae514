//! uxpal - LLM role pipeline that turns a UI request into Figma-ready JSON
//!
//! A request passes through a fixed sequence of role stages (analyzer,
//! designer, JSON engineer). The designer's layout is checked by a Design QA
//! loop against the design system, and the last stage's output is normalized
//! into a ready artifact. An optional screenshot review refines that artifact.
//!
//! uxpal can be used in two ways:
//! - **CLI**: run `uxpal run --input "..."` from a project directory
//! - **Library**: build a [`PipelineOrchestrator`] from a [`Config`]
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Run every stage for a request
//! uxpal run --input "A login page with email and password"
//!
//! # Re-run stage 3 of an earlier run
//! uxpal stage 3 --run-id 20250101_120000
//!
//! # Check a layout file
//! uxpal validate figma-ready/figma_ready_20250101_120000.json
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use uxpal::{Config, PipelineOrchestrator, RunOptions};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::builder().platform("Desktop").build()?;
//! let orchestrator = PipelineOrchestrator::from_config(&config)?;
//! let summary = orchestrator
//!     .run_all("A settings screen", RunOptions::default())
//!     .await?;
//! println!("{:?}", summary.final_artifact.path);
//! # Ok(())
//! # }
//! ```
//!
//! # Stable Public API
//!
//! - [`PipelineOrchestrator`], [`RunOptions`] and [`RunSummary`] - running pipelines
//! - [`Config`] and [`ConfigBuilder`] - configuration management
//! - [`UxpalError`] - library error type
//! - [`ExitCode`] - CLI exit codes
//!
//! The member crates are re-exported under module paths for embedders that
//! drive single steps.

// ============================================================================
// Stable Public API
// ============================================================================

/// Configuration for uxpal runs.
///
/// `Config` provides hierarchical configuration with discovery and precedence:
/// CLI arguments > environment > config file > built-in defaults.
///
/// Use [`Config::discover()`] for CLI-like behavior or [`Config::builder()`]
/// for programmatic configuration.
pub use uxpal_config::Config;

/// Builder for programmatic configuration.
///
/// ```rust
/// use uxpal::Config;
/// use std::time::Duration;
///
/// let config = Config::builder()
///     .output_dir("/tmp/uxpal-out")
///     .stage_timeout(Duration::from_secs(120))
///     .build()
///     .expect("Failed to build config");
/// assert_eq!(config.stage_timeout(), Duration::from_secs(120));
/// ```
pub use uxpal_config::ConfigBuilder;

/// CLI argument overrides for [`Config::discover()`].
pub use uxpal_config::CliArgs;

/// Library-level error type.
///
/// Provides user-facing reports via
/// [`display_for_user()`](UxpalError::display_for_user) and exit code mapping
/// via [`to_exit_code()`](UxpalError::to_exit_code). Library code never calls
/// `std::process::exit()`.
pub use uxpal_utils::error::UxpalError;

/// Exit codes matching the documented exit code table.
pub use uxpal_utils::exit_codes::ExitCode;

/// Error categories for grouping similar errors.
pub use uxpal_utils::error::ErrorCategory;

/// Trait for providing user-friendly error reporting.
pub use uxpal_utils::error::UserFriendlyError;

pub use uxpal_utils::types::RunId;

pub use uxpal_engine::{
    ArtifactStatus, FinalArtifact, PipelineKind, PipelineOrchestrator, QaOutcome, QaResult,
    RunOptions, RunSummary, StageRun, VisualOutcome, validate_layout,
};

// ============================================================================
// Member crates - accessible but not stable
// ============================================================================

#[doc(hidden)]
pub use uxpal_config as config;
#[doc(hidden)]
pub use uxpal_engine as engine;
#[doc(hidden)]
pub use uxpal_extraction as extraction;
#[doc(hidden)]
pub use uxpal_llm as llm;
#[doc(hidden)]
pub use uxpal_utils::{error, exit_codes, logging, types};

// CLI module - exported with #[doc(hidden)] for white-box testing of flag parsing
#[doc(hidden)]
pub mod cli;
