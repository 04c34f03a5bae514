use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use uxpal_utils::types::ConfigSource;

pub const DEFAULT_OUTPUT_DIR: &str = "uxpal_outputs";
pub const DEFAULT_READY_DIR: &str = "figma-ready";
pub const DEFAULT_PLATFORM: &str = "Mobile";
pub const DEFAULT_PIPELINE: &str = "alt3";
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 600;
pub const MIN_STAGE_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_PROMPTS_DIR: &str = "prompts/roles";
pub const DEFAULT_DESIGN_SYSTEM_DIR: &str = "design-system";

pub const DEFAULT_PROVIDER: &str = "gemini";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

pub const DEFAULT_QA_MAX_ITERATIONS: u32 = 3;
/// Upper bound for QA iterations; larger values are clamped.
pub const MAX_QA_ITERATIONS: u32 = 3;

pub const DEFAULT_REQUESTS_DIR: &str = "render-requests";
pub const DEFAULT_SCREENSHOTS_DIR: &str = "screenshots";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_SCREENSHOT_TIMEOUT_SECS: u64 = 300;

pub const SUPPORTED_PIPELINES: &[&str] = &["alt3", "classic"];
pub const SUPPORTED_PROVIDERS: &[&str] = &["gemini", "placeholder"];

/// Configuration for uxpal runs.
///
/// `Config` is passed explicitly into the orchestrator; nothing reads it from
/// global state, so concurrent runs may use different configurations.
///
/// # Discovery
///
/// [`Config::discover()`] searches for `.uxpal/config.toml` upward from the
/// current directory (or uses `UXPAL_HOME/config.toml`), then applies
/// environment and CLI overrides.
///
/// # Configuration File Format
///
/// ```toml
/// [defaults]
/// output_dir = "uxpal_outputs"
/// platform = "Mobile"
/// pipeline = "alt3"
///
/// [llm]
/// provider = "gemini"
/// model = "gemini-1.5-flash"
///
/// [qa]
/// enabled = true
/// max_iterations = 2
///
/// [screenshot]
/// enabled = true
/// timeout_secs = 300
/// ```
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Paths and pipeline defaults.
    pub defaults: Defaults,
    /// LLM provider configuration.
    pub llm: LlmConfig,
    /// Design QA loop configuration.
    pub qa: QaConfig,
    /// Screenshot hand-off configuration.
    pub screenshot: ScreenshotConfig,
    /// Source attribution for each setting (for `uxpal config`).
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// `[defaults]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Defaults {
    pub output_dir: Option<String>,
    pub ready_dir: Option<String>,
    pub platform: Option<String>,
    pub pipeline: Option<String>,
    pub stage_timeout_secs: Option<u64>,
    pub prompts_dir: Option<String>,
    pub design_system_dir: Option<String>,
}

/// `[llm]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LlmConfig {
    /// `gemini` or `placeholder`
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// `[qa]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct QaConfig {
    pub enabled: Option<bool>,
    pub max_iterations: Option<u32>,
}

/// `[screenshot]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScreenshotConfig {
    pub enabled: Option<bool>,
    pub requests_dir: Option<String>,
    pub screenshots_dir: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

impl Config {
    #[must_use]
    pub fn output_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(
            self.defaults
                .output_dir
                .as_deref()
                .unwrap_or(DEFAULT_OUTPUT_DIR),
        )
    }

    #[must_use]
    pub fn ready_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.defaults.ready_dir.as_deref().unwrap_or(DEFAULT_READY_DIR))
    }

    #[must_use]
    pub fn platform(&self) -> &str {
        self.defaults.platform.as_deref().unwrap_or(DEFAULT_PLATFORM)
    }

    #[must_use]
    pub fn pipeline(&self) -> &str {
        self.defaults.pipeline.as_deref().unwrap_or(DEFAULT_PIPELINE)
    }

    /// Upper bound on one stage's provider call.
    #[must_use]
    pub fn stage_timeout(&self) -> Duration {
        let secs = self
            .defaults
            .stage_timeout_secs
            .unwrap_or(DEFAULT_STAGE_TIMEOUT_SECS)
            .max(MIN_STAGE_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    #[must_use]
    pub fn prompts_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(
            self.defaults
                .prompts_dir
                .as_deref()
                .unwrap_or(DEFAULT_PROMPTS_DIR),
        )
    }

    #[must_use]
    pub fn design_system_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(
            self.defaults
                .design_system_dir
                .as_deref()
                .unwrap_or(DEFAULT_DESIGN_SYSTEM_DIR),
        )
    }

    #[must_use]
    pub fn llm_provider(&self) -> &str {
        self.llm.provider.as_deref().unwrap_or(DEFAULT_PROVIDER)
    }

    #[must_use]
    pub fn llm_model(&self) -> &str {
        self.llm.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    #[must_use]
    pub fn api_key_env(&self) -> &str {
        self.llm.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV)
    }

    #[must_use]
    pub fn max_tokens(&self) -> u32 {
        self.llm.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    #[must_use]
    pub fn temperature(&self) -> f32 {
        self.llm.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    /// Effective QA iteration cap, clamped to `0..=3`.
    ///
    /// Returns 0 when QA is disabled, which skips the loop entirely.
    #[must_use]
    pub fn qa_max_iterations(&self) -> u32 {
        if self.qa.enabled == Some(false) {
            return 0;
        }
        self.qa
            .max_iterations
            .unwrap_or(DEFAULT_QA_MAX_ITERATIONS)
            .min(MAX_QA_ITERATIONS)
    }

    #[must_use]
    pub fn qa_enabled(&self) -> bool {
        self.qa_max_iterations() > 0
    }

    #[must_use]
    pub fn screenshot_enabled(&self) -> bool {
        self.screenshot.enabled.unwrap_or(false)
    }

    #[must_use]
    pub fn requests_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(
            self.screenshot
                .requests_dir
                .as_deref()
                .unwrap_or(DEFAULT_REQUESTS_DIR),
        )
    }

    #[must_use]
    pub fn screenshots_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(
            self.screenshot
                .screenshots_dir
                .as_deref()
                .unwrap_or(DEFAULT_SCREENSHOTS_DIR),
        )
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.screenshot
                .poll_interval_secs
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
                .max(1),
        )
    }

    #[must_use]
    pub fn screenshot_timeout(&self) -> Duration {
        Duration::from_secs(
            self.screenshot
                .timeout_secs
                .unwrap_or(DEFAULT_SCREENSHOT_TIMEOUT_SECS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::default();
        assert_eq!(config.output_dir(), Utf8PathBuf::from("uxpal_outputs"));
        assert_eq!(config.ready_dir(), Utf8PathBuf::from("figma-ready"));
        assert_eq!(config.platform(), "Mobile");
        assert_eq!(config.pipeline(), "alt3");
        assert_eq!(config.llm_provider(), "gemini");
        assert_eq!(config.llm_model(), "gemini-1.5-flash");
        assert_eq!(config.api_key_env(), "GEMINI_API_KEY");
        assert_eq!(config.stage_timeout(), Duration::from_secs(600));
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.screenshot_timeout(), Duration::from_secs(300));
        assert!(!config.screenshot_enabled());
    }

    #[test]
    fn test_qa_iterations_are_clamped() {
        let mut config = Config::default();
        config.qa.max_iterations = Some(10);
        assert_eq!(config.qa_max_iterations(), 3);

        config.qa.max_iterations = Some(0);
        assert_eq!(config.qa_max_iterations(), 0);
        assert!(!config.qa_enabled());
    }

    #[test]
    fn test_qa_disabled_forces_zero_iterations() {
        let mut config = Config::default();
        config.qa.enabled = Some(false);
        config.qa.max_iterations = Some(2);
        assert_eq!(config.qa_max_iterations(), 0);
    }

    #[test]
    fn test_stage_timeout_has_floor() {
        let mut config = Config::default();
        config.defaults.stage_timeout_secs = Some(1);
        assert_eq!(config.stage_timeout(), Duration::from_secs(5));
    }
}
