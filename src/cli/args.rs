//! CLI argument definitions and parsing structures
//!
//! This module defines the command-line interface structure using clap,
//! including the main `Cli` struct and the subcommand enum.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// uxpal - LLM pipeline that turns a UI request into Figma-ready JSON
#[derive(Parser, Debug)]
#[command(name = "uxpal")]
#[command(about = "Turn a free-text UI request into Figma-ready layout JSON through LLM role stages")]
#[command(long_about = r#"
uxpal runs a fixed sequence of LLM role stages over a UI request. Each stage's
output feeds the next; a Design QA loop checks the designer's layout against
the design system, and an optional screenshot review refines the final JSON.

EXAMPLES:
  # Run every stage for a request
  uxpal run --input "A login page with email, password and a sign-in button"

  # Read the request from a file and print the run summary as JSON
  uxpal run --input-file request.txt --json

  # Use the five-role pipeline without QA
  uxpal run --input "Settings screen" --pipeline classic --qa-iterations 0

  # Wait for a screenshot and run the visual review after the final stage
  uxpal run --input "Checkout flow" --visual --wait-secs 120

  # Re-run stage 3 of an existing run
  uxpal stage 3 --run-id 20250101_120000

  # Re-run Design QA over an existing run
  uxpal qa 20250101_120000 --iterations 2

  # Check a layout file
  uxpal validate figma-ready/figma_ready_20250101_120000.json

  # Show the effective configuration and where each value came from
  uxpal config

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > environment > config file > defaults
  The config file is discovered by searching upward from CWD for .uxpal/config.toml
  Use --config to specify an explicit config file path

PIPELINES:
  alt3     Request Analyzer → UX/UI Designer → [Design QA] → JSON Engineer
           (+ Visual Improvement Analyzer → JSON Engineer Improved with --visual)
  classic  Product Manager → Product Designer → UX Designer → UI Designer → JSON Engineer
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// LLM provider (gemini or placeholder)
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// Model to use for LLM provider calls
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Directory for stage records and run summaries
    #[arg(long, global = true)]
    pub output_dir: Option<String>,

    /// Target platform bound into the prompts (e.g. Mobile, Desktop)
    #[arg(long, global = true)]
    pub platform: Option<String>,

    /// Stage timeout in seconds (default: 600, min: 5)
    #[arg(long, global = true)]
    pub stage_timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every stage of the pipeline for a request
    ///
    /// The request comes from --input, --input-file, or stdin when neither is given.
    Run {
        /// Request text
        #[arg(long, conflicts_with = "input_file")]
        input: Option<String>,

        /// File holding the request text
        #[arg(long)]
        input_file: Option<PathBuf>,

        /// Pipeline to run (alt3 or classic)
        #[arg(long)]
        pipeline: Option<String>,

        /// Design QA iterations (0-3, 0 disables QA)
        #[arg(long)]
        qa_iterations: Option<u32>,

        /// Wait for a screenshot and run the visual review stages
        #[arg(long)]
        visual: bool,

        /// Seconds to wait for the screenshot
        #[arg(long, requires = "visual")]
        wait_secs: Option<u64>,

        /// Run id to use instead of the current timestamp (YYYYMMDD_HHMMSS)
        #[arg(long)]
        run_id: Option<String>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a single stage of an existing run
    ///
    /// Stage N reads stage N-1's saved output; stage 1 needs --input.
    Stage {
        /// Stage number (1-based)
        stage: u8,

        /// Run whose artifacts to use
        #[arg(long)]
        run_id: String,

        /// Request text (stage 1 only)
        #[arg(long)]
        input: Option<String>,

        /// Pipeline the run used (alt3 or classic)
        #[arg(long)]
        pipeline: Option<String>,
    },

    /// Run Design QA over the designer output of an existing run
    Qa {
        /// Run whose designer output to check
        run_id: String,

        /// Iteration cap (0-3)
        #[arg(long)]
        iterations: Option<u32>,
    },

    /// Wait for a screenshot and run the visual review for an existing run
    Visual {
        /// Run whose ready artifact to review
        run_id: String,

        /// Seconds to wait for the screenshot
        #[arg(long)]
        wait_secs: Option<u64>,
    },

    /// Check a layout JSON file for structure and text-node issues
    Validate {
        /// JSON file to check
        file: PathBuf,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration and value sources
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    /// Operation name used in error reports.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Run { .. } => "run",
            Self::Stage { .. } => "stage",
            Self::Qa { .. } => "qa",
            Self::Visual { .. } => "visual",
            Self::Validate { .. } => "validate",
            Self::Config { .. } => "config",
        }
    }
}

/// Build the clap command (for completions and tests).
#[must_use]
pub fn build_cli() -> clap::Command {
    <Cli as clap::CommandFactory>::command()
}
