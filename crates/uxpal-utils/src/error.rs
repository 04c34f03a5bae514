use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Library-level error type with rich context and user-friendly reporting.
///
/// `UxpalError` is what the CLI sees when a command cannot complete. Errors that
/// concern the *quality of a run's data* (a provider hiccup inside a stage, an
/// unparseable critique or a screenshot that never arrived) are absorbed by the
/// engine and never surface here. What remains are caller misuse and hard
/// infrastructure failures.
///
/// # Exit Code Mapping
///
/// | Exit Code | Error Type |
/// |-----------|------------|
/// | 2 | Configuration/CLI argument errors |
/// | 3 | Missing upstream stage artifact |
/// | 4 | Final artifact failed JSON validation |
/// | 10 | Stage timeout |
/// | 70 | LLM provider failure |
/// | 130 | Run cancelled |
/// | 1 | Other errors |
///
/// # Example
///
/// ```rust
/// use uxpal_utils::error::{StageError, UxpalError};
/// use uxpal_utils::exit_codes::ExitCode;
///
/// let err = UxpalError::Stage(StageError::MissingDependency {
///     stage: 2,
///     dependency: 1,
///     run_id: "20250101_120000".to_string(),
/// });
/// assert_eq!(err.to_exit_code(), ExitCode::MISSING_DEPENDENCY);
/// ```
#[derive(Error, Debug)]
pub enum UxpalError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Stage execution error: {0}")]
    Stage(#[from] StageError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Final artifact for run {run_id} is not valid JSON: {reason}")]
    ValidationFailed { run_id: String, reason: String },

    #[error("Run {run_id} was cancelled")]
    Cancelled { run_id: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    StageExecution,
    ProviderIntegration,
    FileSystem,
    Validation,
    Cancellation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::StageExecution => write!(f, "Stage Execution"),
            Self::ProviderIntegration => write!(f, "Provider Integration"),
            Self::FileSystem => write!(f, "File System"),
            Self::Validation => write!(f, "Validation"),
            Self::Cancellation => write!(f, "Cancellation"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(path) => format!("The configuration file could not be read: {path}"),
            Self::InvalidValue { key, value } => {
                format!("Configuration key '{key}' has an invalid value: {value}")
            }
            Self::MissingRequired(key) => format!("Required configuration '{key}' is missing"),
            Self::DiscoveryFailed { reason } => {
                format!("Could not locate configuration: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) => Some(
                "uxpal reads .uxpal/config.toml from the nearest ancestor directory.".to_string(),
            ),
            Self::InvalidValue { .. } | Self::MissingRequired(_) => Some(
                "Values are resolved with precedence: CLI flags > environment > config file > defaults."
                    .to_string(),
            ),
            Self::DiscoveryFailed { .. } => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax of .uxpal/config.toml".to_string(),
                "Pass --config to point at a specific file".to_string(),
            ],
            Self::InvalidValue { key, .. } => vec![
                format!("Fix '{key}' in .uxpal/config.toml or override it on the command line"),
                "Run 'uxpal config' to see the effective configuration".to_string(),
            ],
            Self::MissingRequired(key) => vec![format!("Set '{key}' in .uxpal/config.toml")],
            Self::DiscoveryFailed { .. } => vec![
                "Run uxpal from inside your project directory".to_string(),
                "Set UXPAL_HOME to the directory holding config.toml".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Errors raised while preparing or executing a single pipeline stage.
///
/// Provider failures during a stage are *not* reported here; they are folded
/// into the stage's content as a failed variant so the run can continue.
#[derive(Error, Debug, Clone)]
pub enum StageError {
    #[error("Stage {stage} requires the output of stage {dependency} for run {run_id}")]
    MissingDependency {
        stage: u8,
        dependency: u8,
        run_id: String,
    },

    #[error("Stage {stage} is not part of the {pipeline} pipeline")]
    UnknownStage { stage: u8, pipeline: String },

    #[error("Prompt template for stage {stage} not found at {path}")]
    TemplateNotFound { stage: u8, path: String },

    #[error("Stage {stage} input is missing: {reason}")]
    MissingInput { stage: u8, reason: String },

    #[error("Failed to persist output of stage {stage}: {reason}")]
    PersistFailed { stage: u8, reason: String },

    #[error("Run {run_id} has no {artifact}")]
    MissingArtifact { artifact: String, run_id: String },

    #[error("Output of stage {stage} for run {run_id} already exists at {path}")]
    OutputExists {
        stage: u8,
        path: String,
        run_id: String,
    },
}

impl UserFriendlyError for StageError {
    fn user_message(&self) -> String {
        match self {
            Self::MissingDependency {
                stage,
                dependency,
                run_id,
            } => format!(
                "Cannot run stage {stage}: no output from stage {dependency} exists for run {run_id}"
            ),
            Self::UnknownStage { stage, pipeline } => {
                format!("Stage {stage} does not exist in the '{pipeline}' pipeline")
            }
            Self::TemplateNotFound { stage, path } => {
                format!("The prompt template for stage {stage} is missing ({path})")
            }
            Self::MissingInput { stage, reason } => {
                format!("Stage {stage} has no input: {reason}")
            }
            Self::PersistFailed { stage, reason } => {
                format!("The output of stage {stage} could not be saved: {reason}")
            }
            Self::MissingArtifact { artifact, run_id } => {
                format!("Run {run_id} has no {artifact}")
            }
            Self::OutputExists { stage, run_id, .. } => {
                format!("Run {run_id} already has output for stage {stage}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::MissingDependency { .. } => Some(
                "Each stage consumes the previous stage's output, looked up by run id.".to_string(),
            ),
            Self::TemplateNotFound { .. } => Some(
                "Prompt templates are plain text files loaded from the prompts directory.".to_string(),
            ),
            Self::OutputExists { path, .. } => Some(format!(
                "Stage outputs of a pipeline run are written once; {path} is already on disk."
            )),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::MissingDependency {
                dependency, run_id, ..
            } => vec![
                format!("Run stage {dependency} first: uxpal stage {dependency} --run-id {run_id}"),
                "Or run the whole pipeline: uxpal run --input \"...\"".to_string(),
            ],
            Self::UnknownStage { .. } => {
                vec!["Use --pipeline classic for stages 1-5 of the role pipeline".to_string()]
            }
            Self::TemplateNotFound { .. } => vec![
                "Check [defaults].prompts_dir in .uxpal/config.toml".to_string(),
            ],
            Self::MissingInput { .. } => vec!["Pass --input with the request text".to_string()],
            Self::PersistFailed { .. } => vec![
                "Check that the output directory is writable".to_string(),
                "Check available disk space".to_string(),
            ],
            Self::MissingArtifact { run_id, .. } => vec![format!(
                "Complete the pipeline for run {run_id} first: uxpal run --run-id {run_id} --input \"...\""
            )],
            Self::OutputExists { stage, run_id, .. } => vec![
                "Omit --run-id to start a fresh run".to_string(),
                format!("Re-run a single stage instead: uxpal stage {stage} --run-id {run_id}"),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::PersistFailed { .. } => ErrorCategory::FileSystem,
            _ => ErrorCategory::StageExecution,
        }
    }
}

/// Errors that can occur during LLM backend operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    /// Transport-level failure (HTTP connectivity, malformed response)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// Configuration error
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Unsupported feature or provider
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The caller cancelled the invocation
    #[error("Invocation cancelled")]
    Cancelled,
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("LLM transport error: {msg}"),
            Self::ProviderAuth(msg) => format!("LLM provider authentication failed: {msg}"),
            Self::ProviderQuota(msg) => format!("LLM provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("LLM provider service outage: {msg}"),
            Self::Timeout { duration } => {
                format!("LLM invocation timed out after {duration:?}")
            }
            Self::Misconfiguration(msg) => format!("LLM configuration error: {msg}"),
            Self::Unsupported(msg) => format!("LLM feature not supported: {msg}"),
            Self::Cancelled => "LLM invocation was cancelled".to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::ProviderAuth(_) => Some(
                "Authentication errors indicate missing or invalid API keys.".to_string(),
            ),
            Self::ProviderQuota(_) => Some(
                "Quota errors occur when rate limits or usage limits are exceeded.".to_string(),
            ),
            Self::ProviderOutage(_) => {
                Some("Provider outages are temporary service disruptions.".to_string())
            }
            Self::Timeout { .. } => Some(
                "Timeouts occur when a call takes longer than the configured stage timeout."
                    .to_string(),
            ),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Transport(_) => vec![
                "Verify network connectivity".to_string(),
                "Run with --verbose to see request details".to_string(),
            ],
            Self::ProviderAuth(_) => vec![
                "Check that GEMINI_API_KEY (or [llm].api_key_env) is set".to_string(),
                "Verify the API key is valid and not expired".to_string(),
            ],
            Self::ProviderQuota(_) | Self::ProviderOutage(_) => {
                vec!["Wait a few minutes and start a new run".to_string()]
            }
            Self::Timeout { .. } => {
                vec!["Increase [defaults].stage_timeout_secs in .uxpal/config.toml".to_string()]
            }
            Self::Misconfiguration(_) | Self::Unsupported(_) => vec![
                "Check the [llm] section of .uxpal/config.toml".to_string(),
                "Supported providers: gemini, placeholder".to_string(),
            ],
            Self::Cancelled => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ProviderAuth(_) | Self::Misconfiguration(_) | Self::Unsupported(_) => {
                ErrorCategory::Configuration
            }
            Self::Timeout { .. } => ErrorCategory::StageExecution,
            Self::Cancelled => ErrorCategory::Cancellation,
            _ => ErrorCategory::ProviderIntegration,
        }
    }
}

impl UserFriendlyError for UxpalError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(err) => err.user_message(),
            Self::Stage(err) => err.user_message(),
            Self::Llm(err) => err.user_message(),
            Self::ValidationFailed { run_id, reason } => {
                format!("Run {run_id} finished but its final JSON could not be parsed: {reason}")
            }
            Self::Cancelled { run_id } => format!("Run {run_id} was cancelled"),
            Self::Io(err) => format!("File system error: {err}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(err) => err.context(),
            Self::Stage(err) => err.context(),
            Self::Llm(err) => err.context(),
            Self::ValidationFailed { .. } => Some(
                "Every stage output was kept on disk so the raw responses can be inspected."
                    .to_string(),
            ),
            Self::Cancelled { .. } => {
                Some("Outputs written before cancellation were kept.".to_string())
            }
            Self::Io(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(err) => err.suggestions(),
            Self::Stage(err) => err.suggestions(),
            Self::Llm(err) => err.suggestions(),
            Self::ValidationFailed { run_id, .. } => vec![
                format!("Inspect the *_output.txt files for run {run_id}"),
                "Start a fresh run; stages are never retried within a run".to_string(),
            ],
            Self::Cancelled { .. } => Vec::new(),
            Self::Io(_) => vec!["Check permissions on the output directories".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(err) => err.category(),
            Self::Stage(err) => err.category(),
            Self::Llm(err) => err.category(),
            Self::ValidationFailed { .. } => ErrorCategory::Validation,
            Self::Cancelled { .. } => ErrorCategory::Cancellation,
            Self::Io(_) => ErrorCategory::FileSystem,
        }
    }
}

impl UxpalError {
    /// Render the error with context and suggestions for terminal output.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut out = format!("✗ {} error: {}", self.category(), self.user_message());
        if let Some(context) = self.context() {
            out.push_str("\n\n");
            out.push_str(&context);
        }
        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            out.push_str("\n\nSuggestions:");
            for suggestion in suggestions {
                out.push_str("\n  • ");
                out.push_str(&suggestion);
            }
        }
        out
    }

    /// Map this error to the process exit code the CLI should return.
    #[must_use]
    pub fn to_exit_code(&self) -> crate::exit_codes::ExitCode {
        use crate::exit_codes::ExitCode;

        match self {
            Self::Config(_) => ExitCode::CLI_ARGS,
            Self::Stage(
                StageError::MissingDependency { .. } | StageError::MissingArtifact { .. },
            ) => ExitCode::MISSING_DEPENDENCY,
            Self::Stage(
                StageError::UnknownStage { .. }
                | StageError::MissingInput { .. }
                | StageError::OutputExists { .. },
            ) => ExitCode::CLI_ARGS,
            Self::Stage(_) => ExitCode::INTERNAL,
            Self::Llm(LlmError::Timeout { .. }) => ExitCode::STAGE_TIMEOUT,
            Self::Llm(LlmError::Misconfiguration(_) | LlmError::Unsupported(_)) => {
                ExitCode::CLI_ARGS
            }
            Self::Llm(LlmError::Cancelled) | Self::Cancelled { .. } => ExitCode::CANCELLED,
            Self::Llm(_) => ExitCode::PROVIDER_FAILURE,
            Self::ValidationFailed { .. } => ExitCode::VALIDATION_FAILED,
            Self::Io(_) => ExitCode::INTERNAL,
        }
    }
}

/// Find the most specific exit code for an `anyhow` error chain.
///
/// Application glue returns `anyhow::Error`; this walks the chain for a typed
/// error so the CLI still reports a meaningful code.
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> crate::exit_codes::ExitCode {
    for cause in err.chain() {
        if let Some(uxpal) = cause.downcast_ref::<UxpalError>() {
            return uxpal.to_exit_code();
        }
        if let Some(stage) = cause.downcast_ref::<StageError>() {
            return match stage {
                StageError::MissingDependency { .. } | StageError::MissingArtifact { .. } => {
                    crate::exit_codes::ExitCode::MISSING_DEPENDENCY
                }
                StageError::UnknownStage { .. }
                | StageError::MissingInput { .. }
                | StageError::OutputExists { .. } => crate::exit_codes::ExitCode::CLI_ARGS,
                _ => crate::exit_codes::ExitCode::INTERNAL,
            };
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return crate::exit_codes::ExitCode::CLI_ARGS;
        }
    }
    crate::exit_codes::ExitCode::INTERNAL
}

/// Find a user-facing report for an `anyhow` error chain.
#[must_use]
pub fn report_for(err: &anyhow::Error) -> String {
    for cause in err.chain() {
        if let Some(uxpal) = cause.downcast_ref::<UxpalError>() {
            return uxpal.display_for_user();
        }
        if let Some(stage) = cause.downcast_ref::<StageError>() {
            return UxpalError::Stage(stage.clone()).display_for_user();
        }
    }
    format!("✗ Error: {err:#}")
}
