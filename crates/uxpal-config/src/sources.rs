use std::collections::BTreeMap;

use super::{Config, ConfigSource};

fn source_label(source: Option<&ConfigSource>) -> String {
    source.unwrap_or(&ConfigSource::Default).as_str().to_string()
}

impl Config {
    /// Effective configuration as `key -> (value, source)`.
    ///
    /// Values are the resolved ones (defaults applied), so the output shows
    /// exactly what a run would use.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut config = BTreeMap::new();

        let mut add = |key: &str, value: String| {
            let source = source_label(self.source_attribution.get(key));
            config.insert(key.to_string(), (value, source));
        };

        add("output_dir", self.output_dir().to_string());
        add("ready_dir", self.ready_dir().to_string());
        add("platform", self.platform().to_string());
        add("pipeline", self.pipeline().to_string());
        add("stage_timeout_secs", self.stage_timeout().as_secs().to_string());
        add("prompts_dir", self.prompts_dir().to_string());
        add("design_system_dir", self.design_system_dir().to_string());
        add("llm_provider", self.llm_provider().to_string());
        add("llm_model", self.llm_model().to_string());
        add("api_key_env", self.api_key_env().to_string());
        if let Some(base_url) = &self.llm.base_url {
            add("base_url", base_url.clone());
        }
        add("max_tokens", self.max_tokens().to_string());
        add("temperature", self.temperature().to_string());
        add("qa_max_iterations", self.qa_max_iterations().to_string());
        add("screenshot_enabled", self.screenshot_enabled().to_string());
        add("requests_dir", self.requests_dir().to_string());
        add("screenshots_dir", self.screenshots_dir().to_string());
        add("poll_interval_secs", self.poll_interval().as_secs().to_string());
        add(
            "screenshot_timeout_secs",
            self.screenshot_timeout().as_secs().to_string(),
        );

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_config_reports_sources() {
        let config = Config::builder().platform("Desktop").build().unwrap();
        let effective = config.effective_config();

        assert_eq!(
            effective.get("platform"),
            Some(&("Desktop".to_string(), "programmatic".to_string()))
        );
        assert_eq!(
            effective.get("pipeline"),
            Some(&("alt3".to_string(), "default".to_string()))
        );
        assert!(!effective.contains_key("base_url"));
    }
}
