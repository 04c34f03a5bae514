//! Logging and observability for uxpal
//!
//! Structured `tracing` output with a compact human format by default, span
//! timing in verbose mode, and a JSON layer for machine consumption.

use tracing::{Level, error, info, span, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Output format for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable compact lines
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("uxpal=debug,info")
            } else {
                EnvFilter::try_new("uxpal=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` always wins over the built-in filter. Verbose mode enables
/// debug output for uxpal crates and emits span close events with timings.
pub fn init_tracing(verbose: bool, format: LogFormat) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = default_filter(verbose);

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_span_list(false)
                        .with_writer(std::io::stderr),
                )
                .try_init()?;
        }
        LogFormat::Compact if verbose => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_line_number(false)
                        .with_file(false)
                        .with_span_events(FmtSpan::CLOSE)
                        .with_writer(std::io::stderr)
                        .compact(),
                )
                .try_init()?;
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_line_number(false)
                        .with_file(false)
                        .with_writer(std::io::stderr)
                        .compact(),
                )
                .try_init()?;
        }
    }

    Ok(())
}

/// Create a span for one stage execution
pub fn stage_span(run_id: &str, stage: u8, label: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "stage_execution",
        run_id = %run_id,
        stage = stage,
        label = %label,
    )
}

/// Log stage start with structured fields
pub fn log_stage_start(run_id: &str, stage: u8, label: &str, input_chars: usize) {
    info!(
        run_id = %run_id,
        stage = stage,
        label = %label,
        input_chars = input_chars,
        "Starting stage"
    );
}

/// Log stage completion with duration
pub fn log_stage_complete(run_id: &str, stage: u8, duration_ms: u128, output_chars: usize) {
    info!(
        run_id = %run_id,
        stage = stage,
        duration_ms = %duration_ms,
        output_chars = output_chars,
        "Stage completed"
    );
}

/// Log a stage whose provider call failed.
///
/// The run continues with the failure recorded as the stage's content.
pub fn log_stage_degraded(run_id: &str, stage: u8, error: &str, duration_ms: u128) {
    warn!(
        run_id = %run_id,
        stage = stage,
        duration_ms = %duration_ms,
        error = %error,
        "Stage provider call failed; continuing with degraded content"
    );
}

/// Log a fatal run error
pub fn log_run_error(run_id: &str, error: &str) {
    error!(run_id = %run_id, error = %error, "Run failed");
}
