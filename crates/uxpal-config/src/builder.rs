use std::collections::HashMap;
use std::time::Duration;

use uxpal_utils::error::ConfigError;

use super::{Config, ConfigSource, Defaults, LlmConfig, QaConfig, ScreenshotConfig};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// Use this when embedding uxpal or in tests, where behaviour must not
    /// depend on the user's environment or config files.
    ///
    /// ```rust
    /// use uxpal_config::Config;
    ///
    /// let config = Config::builder()
    ///     .output_dir("/tmp/uxpal")
    ///     .llm_provider("placeholder")
    ///     .qa_max_iterations(0)
    ///     .build()
    ///     .unwrap();
    /// assert!(!config.qa_enabled());
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Fluent builder for [`Config`].
///
/// All values set via the builder are attributed to
/// `ConfigSource::Programmatic`.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    defaults: Defaults,
    llm: LlmConfig,
    qa: QaConfig,
    screenshot: ScreenshotConfig,
    touched: Vec<&'static str>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn mark(mut self, key: &'static str) -> Self {
        self.touched.push(key);
        self
    }

    #[must_use]
    pub fn output_dir(mut self, path: impl Into<String>) -> Self {
        self.defaults.output_dir = Some(path.into());
        self.mark("output_dir")
    }

    #[must_use]
    pub fn ready_dir(mut self, path: impl Into<String>) -> Self {
        self.defaults.ready_dir = Some(path.into());
        self.mark("ready_dir")
    }

    #[must_use]
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.defaults.platform = Some(platform.into());
        self.mark("platform")
    }

    #[must_use]
    pub fn pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.defaults.pipeline = Some(pipeline.into());
        self.mark("pipeline")
    }

    #[must_use]
    pub fn stage_timeout(mut self, timeout: Duration) -> Self {
        self.defaults.stage_timeout_secs = Some(timeout.as_secs());
        self.mark("stage_timeout_secs")
    }

    #[must_use]
    pub fn prompts_dir(mut self, path: impl Into<String>) -> Self {
        self.defaults.prompts_dir = Some(path.into());
        self.mark("prompts_dir")
    }

    #[must_use]
    pub fn design_system_dir(mut self, path: impl Into<String>) -> Self {
        self.defaults.design_system_dir = Some(path.into());
        self.mark("design_system_dir")
    }

    #[must_use]
    pub fn llm_provider(mut self, provider: impl Into<String>) -> Self {
        self.llm.provider = Some(provider.into());
        self.mark("llm_provider")
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.llm.model = Some(model.into());
        self.mark("llm_model")
    }

    #[must_use]
    pub fn api_key_env(mut self, name: impl Into<String>) -> Self {
        self.llm.api_key_env = Some(name.into());
        self.mark("api_key_env")
    }

    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.llm.base_url = Some(url.into());
        self.mark("base_url")
    }

    #[must_use]
    pub fn qa_max_iterations(mut self, iterations: u32) -> Self {
        self.qa.max_iterations = Some(iterations);
        self.mark("qa_max_iterations")
    }

    #[must_use]
    pub fn qa_enabled(mut self, enabled: bool) -> Self {
        self.qa.enabled = Some(enabled);
        self.mark("qa_enabled")
    }

    #[must_use]
    pub fn screenshot_enabled(mut self, enabled: bool) -> Self {
        self.screenshot.enabled = Some(enabled);
        self.mark("screenshot_enabled")
    }

    #[must_use]
    pub fn requests_dir(mut self, path: impl Into<String>) -> Self {
        self.screenshot.requests_dir = Some(path.into());
        self.mark("requests_dir")
    }

    #[must_use]
    pub fn screenshots_dir(mut self, path: impl Into<String>) -> Self {
        self.screenshot.screenshots_dir = Some(path.into());
        self.mark("screenshots_dir")
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.screenshot.poll_interval_secs = Some(interval.as_secs());
        self.mark("poll_interval_secs")
    }

    #[must_use]
    pub fn screenshot_timeout(mut self, timeout: Duration) -> Self {
        self.screenshot.timeout_secs = Some(timeout.as_secs());
        self.mark("screenshot_timeout_secs")
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut source_attribution = HashMap::new();
        for key in &self.touched {
            source_attribution.insert((*key).to_string(), ConfigSource::Programmatic);
        }

        let config = Config {
            defaults: self.defaults,
            llm: self.llm,
            qa: self.qa,
            screenshot: self.screenshot,
            source_attribution,
        };
        config.validate()?;
        Ok(config)
    }
}
