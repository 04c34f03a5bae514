//! Helpers shared by the pipeline commands

use anyhow::{Context, Result};
use std::io::{IsTerminal, Read};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::{Config, PipelineOrchestrator};
use uxpal_utils::error::{ConfigError, StageError, UxpalError};
use uxpal_utils::types::RunId;

/// Resolve the request text from `--input`, `--input-file` or piped stdin.
pub fn read_request(input: Option<String>, input_file: Option<&Path>) -> Result<String> {
    let text = match (input, input_file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file: {}", path.display()))?,
        (None, None) => {
            let mut stdin = std::io::stdin();
            if stdin.is_terminal() {
                return Err(missing_request());
            }
            let mut buf = String::new();
            stdin
                .read_to_string(&mut buf)
                .context("Failed to read request from stdin")?;
            buf
        }
    };

    if text.trim().is_empty() {
        return Err(missing_request());
    }
    Ok(text.trim().to_string())
}

fn missing_request() -> anyhow::Error {
    UxpalError::Stage(StageError::MissingInput {
        stage: 1,
        reason: "no request text given (use --input, --input-file or pipe it on stdin)".to_string(),
    })
    .into()
}

pub(super) fn parse_run_id(raw: &str) -> Result<RunId> {
    RunId::parse(raw).map_err(|e: ConfigError| UxpalError::Config(e).into())
}

/// Orchestrator for `config` that stops when `cancel` fires.
pub(super) fn orchestrator(config: &Config, cancel: CancellationToken) -> Result<PipelineOrchestrator> {
    Ok(PipelineOrchestrator::from_config(config)
        .context("Failed to create orchestrator")?
        .with_cancellation(cancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_inline_input_is_trimmed() {
        let text = read_request(Some("  A login page \n".to_string()), None).unwrap();
        assert_eq!(text, "A login page");
    }

    #[test]
    fn test_input_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("request.txt");
        std::fs::write(&path, "Settings screen\n").unwrap();

        assert_eq!(read_request(None, Some(&path)).unwrap(), "Settings screen");
    }

    #[test]
    fn test_blank_input_is_missing() {
        let err = read_request(Some("   ".to_string()), None).unwrap_err();
        assert_eq!(
            uxpal_utils::error::exit_code_for(&err),
            crate::ExitCode::CLI_ARGS
        );
    }

    #[test]
    fn test_bad_run_id() {
        assert!(parse_run_id("../escape").is_err());
        assert_eq!(parse_run_id("20250101_120000").unwrap().as_str(), "20250101_120000");
    }
}
