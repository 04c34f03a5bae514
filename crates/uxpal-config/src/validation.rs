use uxpal_utils::error::ConfigError;

use super::{Config, MAX_QA_ITERATIONS, MIN_STAGE_TIMEOUT_SECS, SUPPORTED_PIPELINES, SUPPORTED_PROVIDERS};

impl Config {
    /// Reject values that cannot be clamped into something meaningful.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if let Some(pipeline) = &self.defaults.pipeline
            && !SUPPORTED_PIPELINES.contains(&pipeline.as_str())
        {
            return Err(ConfigError::InvalidValue {
                key: "pipeline".to_string(),
                value: format!(
                    "unknown pipeline '{pipeline}' (expected one of: {})",
                    SUPPORTED_PIPELINES.join(", ")
                ),
            });
        }

        if let Some(provider) = &self.llm.provider
            && !SUPPORTED_PROVIDERS.contains(&provider.as_str())
        {
            return Err(ConfigError::InvalidValue {
                key: "llm_provider".to_string(),
                value: format!(
                    "unknown provider '{provider}' (expected one of: {})",
                    SUPPORTED_PROVIDERS.join(", ")
                ),
            });
        }

        if let Some(timeout) = self.defaults.stage_timeout_secs
            && timeout < MIN_STAGE_TIMEOUT_SECS
        {
            return Err(ConfigError::InvalidValue {
                key: "stage_timeout_secs".to_string(),
                value: format!("must be at least {MIN_STAGE_TIMEOUT_SECS} seconds"),
            });
        }

        if let Some(temperature) = self.llm.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(ConfigError::InvalidValue {
                key: "temperature".to_string(),
                value: format!("{temperature} is outside 0.0..=2.0"),
            });
        }

        if self.llm.max_tokens == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "max_tokens".to_string(),
                value: "must be greater than 0".to_string(),
            });
        }

        if let Some(requested) = self.qa.max_iterations
            && requested > MAX_QA_ITERATIONS
        {
            tracing::warn!(
                requested,
                max = MAX_QA_ITERATIONS,
                "QA iteration count clamped"
            );
        }

        if self.screenshot.poll_interval_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "poll_interval_secs".to_string(),
                value: "must be greater than 0".to_string(),
            });
        }

        if let Some(platform) = &self.defaults.platform
            && platform.trim().is_empty()
        {
            return Err(ConfigError::InvalidValue {
                key: "platform".to_string(),
                value: "must not be empty".to_string(),
            });
        }

        Ok(())
    }
}
