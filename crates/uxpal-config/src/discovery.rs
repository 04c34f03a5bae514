use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

use super::{CliArgs, Config, ConfigSource, Defaults, LlmConfig, QaConfig, ScreenshotConfig};

/// Environment variable naming a directory that holds `config.toml`.
pub const HOME_ENV: &str = "UXPAL_HOME";
/// Environment override for `[llm].provider`.
pub const PROVIDER_ENV: &str = "UXPAL_LLM_PROVIDER";
/// Environment override for `[qa].max_iterations`.
pub const QA_ITERATIONS_ENV: &str = "UXPAL_QA_MAX_ITERATIONS";

const CONFIG_DIR: &str = ".uxpal";
const CONFIG_FILE: &str = "config.toml";

/// Keys whose values are always resolved, even when nothing sets them.
const DEFAULTED_KEYS: &[&str] = &[
    "output_dir",
    "ready_dir",
    "platform",
    "pipeline",
    "stage_timeout_secs",
    "prompts_dir",
    "design_system_dir",
    "llm_provider",
    "llm_model",
    "api_key_env",
    "qa_max_iterations",
    "screenshot_enabled",
    "screenshot_timeout_secs",
];

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize, Serialize)]
struct TomlConfig {
    defaults: Option<Defaults>,
    llm: Option<LlmConfig>,
    qa: Option<QaConfig>,
    screenshot: Option<ScreenshotConfig>,
}

/// Copy every `Some` field from `$from` into `$into`, recording `$source`.
macro_rules! overlay {
    ($attr:ident, $source:expr, $into:expr, $from:expr, { $($field:ident => $key:literal),+ $(,)? }) => {
        $(
            if $from.$field.is_some() {
                $into.$field = $from.$field;
                $attr.insert($key.to_string(), $source.clone());
            }
        )+
    };
}

impl Config {
    /// Discover and load configuration with precedence: CLI > env > file > defaults
    ///
    /// Uses the current working directory for config file discovery when no
    /// explicit path is provided in `cli_args`.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let cwd = env::current_dir().context("Failed to get current directory")?;
        let start_dir = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|p| anyhow::anyhow!("Current directory is not UTF-8: {}", p.display()))?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover configuration starting from a specific directory.
    pub fn discover_from(start_dir: &Utf8Path, cli_args: &CliArgs) -> Result<Self> {
        Self::discover_with_env(start_dir, cli_args, |key| env::var(key).ok())
    }

    /// Discover configuration with an explicit environment lookup.
    ///
    /// This is the variant used by tests to avoid process-global state.
    pub fn discover_with_env<F>(start_dir: &Utf8Path, cli_args: &CliArgs, env_lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut source_attribution = HashMap::new();
        for key in DEFAULTED_KEYS {
            source_attribution.insert((*key).to_string(), ConfigSource::Default);
        }

        let mut defaults = Defaults::default();
        let mut llm = LlmConfig::default();
        let mut qa = QaConfig::default();
        let mut screenshot = ScreenshotConfig::default();

        let config_path = match &cli_args.config_path {
            Some(explicit) => Some(explicit.clone()),
            None => match env_lookup(HOME_ENV).filter(|v| !v.is_empty()) {
                Some(home) => Some(Utf8PathBuf::from(home).join(CONFIG_FILE)),
                None => Self::discover_config_file_from(start_dir)?,
            },
        };

        if let Some(path) = &config_path {
            let file_config = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {path}"))?;
            let source = ConfigSource::Config;
            let attr = &mut source_attribution;

            if let Some(file_defaults) = file_config.defaults {
                overlay!(attr, source, defaults, file_defaults, {
                    output_dir => "output_dir",
                    ready_dir => "ready_dir",
                    platform => "platform",
                    pipeline => "pipeline",
                    stage_timeout_secs => "stage_timeout_secs",
                    prompts_dir => "prompts_dir",
                    design_system_dir => "design_system_dir",
                });
            }
            if let Some(file_llm) = file_config.llm {
                overlay!(attr, source, llm, file_llm, {
                    provider => "llm_provider",
                    model => "llm_model",
                    api_key_env => "api_key_env",
                    base_url => "base_url",
                    max_tokens => "max_tokens",
                    temperature => "temperature",
                });
            }
            if let Some(file_qa) = file_config.qa {
                overlay!(attr, source, qa, file_qa, {
                    enabled => "qa_enabled",
                    max_iterations => "qa_max_iterations",
                });
            }
            if let Some(file_screenshot) = file_config.screenshot {
                overlay!(attr, source, screenshot, file_screenshot, {
                    enabled => "screenshot_enabled",
                    requests_dir => "requests_dir",
                    screenshots_dir => "screenshots_dir",
                    poll_interval_secs => "poll_interval_secs",
                    timeout_secs => "screenshot_timeout_secs",
                });
            }
        }

        // Environment overrides the file
        if let Some(provider) = env_lookup(PROVIDER_ENV).filter(|v| !v.is_empty()) {
            llm.provider = Some(provider);
            source_attribution.insert("llm_provider".to_string(), ConfigSource::Env);
        }
        if let Some(raw) = env_lookup(QA_ITERATIONS_ENV).filter(|v| !v.is_empty()) {
            let iterations = raw.trim().parse::<u32>().map_err(|_| {
                uxpal_utils::error::ConfigError::InvalidValue {
                    key: QA_ITERATIONS_ENV.to_string(),
                    value: format!("'{raw}' is not a non-negative integer"),
                }
            })?;
            qa.max_iterations = Some(iterations);
            source_attribution.insert("qa_max_iterations".to_string(), ConfigSource::Env);
        }

        // CLI overrides everything
        let cli = ConfigSource::Cli;
        let attr = &mut source_attribution;
        let cli_defaults = Defaults {
            output_dir: cli_args.output_dir.clone(),
            platform: cli_args.platform.clone(),
            pipeline: cli_args.pipeline.clone(),
            stage_timeout_secs: cli_args.stage_timeout_secs,
            ..Defaults::default()
        };
        overlay!(attr, cli, defaults, cli_defaults, {
            output_dir => "output_dir",
            platform => "platform",
            pipeline => "pipeline",
            stage_timeout_secs => "stage_timeout_secs",
        });
        let cli_llm = LlmConfig {
            provider: cli_args.llm_provider.clone(),
            model: cli_args.model.clone(),
            ..LlmConfig::default()
        };
        overlay!(attr, cli, llm, cli_llm, {
            provider => "llm_provider",
            model => "llm_model",
        });
        if let Some(iterations) = cli_args.qa_max_iterations {
            qa.max_iterations = Some(iterations);
            // An explicit iteration count re-enables a loop disabled in the file
            if iterations > 0 {
                qa.enabled = Some(true);
            }
            attr.insert("qa_max_iterations".to_string(), ConfigSource::Cli);
        }
        let cli_screenshot = ScreenshotConfig {
            enabled: cli_args.screenshot_enabled,
            timeout_secs: cli_args.screenshot_timeout_secs,
            ..ScreenshotConfig::default()
        };
        overlay!(attr, cli, screenshot, cli_screenshot, {
            enabled => "screenshot_enabled",
            timeout_secs => "screenshot_timeout_secs",
        });

        let config = Self {
            defaults,
            llm,
            qa,
            screenshot,
            source_attribution,
        };

        config.validate()?;

        Ok(config)
    }

    /// Discover the config file by searching upward from `start_dir`.
    ///
    /// Walks up looking for `.uxpal/config.toml`, stopping at repository root
    /// markers (.git, .hg, .svn) or the filesystem root.
    pub fn discover_config_file_from(start_dir: &Utf8Path) -> Result<Option<Utf8PathBuf>> {
        let mut current_dir = start_dir;

        loop {
            let config_path = current_dir.join(CONFIG_DIR).join(CONFIG_FILE);
            if config_path.exists() {
                return Ok(Some(config_path));
            }

            if current_dir.join(".git").exists()
                || current_dir.join(".hg").exists()
                || current_dir.join(".svn").exists()
            {
                break;
            }

            match current_dir.parent() {
                Some(parent) => current_dir = parent,
                None => break,
            }
        }

        Ok(None)
    }

    fn load_config_file(path: &Utf8Path) -> Result<TomlConfig> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: TomlConfig = toml::from_str(&content)
                    .with_context(|| format!("Failed to parse TOML config file: {path}"))?;
                Ok(config)
            }
            // A missing file (e.g. an empty UXPAL_HOME) means defaults
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TomlConfig::default()),
            Err(e) => Err(anyhow::anyhow!("Failed to read config file {path}: {e}")),
        }
    }
}
