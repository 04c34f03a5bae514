use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::ConfigError;

/// Correlation key for every artifact of one pipeline run.
///
/// Generated ids are local timestamps with milliseconds followed by the
/// process id and a per-process sequence number
/// (`%Y%m%d_%H%M%S_%3f_{pid:x}{seq:02x}`), so two runs started in the same
/// instant still get distinct ids. Caller-supplied ids
/// are restricted to ASCII alphanumerics, `_` and `-` because they become part
/// of file names.
///
/// ```rust
/// use uxpal_utils::types::RunId;
///
/// let id = RunId::parse("20250803_104626").unwrap();
/// assert_eq!(id.as_str(), "20250803_104626");
/// assert!(RunId::parse("../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    const MAX_LEN: usize = 64;

    /// A fresh run id, unique per invocation.
    #[must_use]
    pub fn generate() -> Self {
        static SEQUENCE: AtomicU32 = AtomicU32::new(0);
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) & 0xff;
        Self(format!(
            "{}_{:x}{seq:02x}",
            chrono::Local::now().format("%Y%m%d_%H%M%S_%3f"),
            std::process::id()
        ))
    }

    /// Validate a caller-supplied run id.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "run_id".to_string(),
                value: "run id must not be empty".to_string(),
            });
        }
        if trimmed.len() > Self::MAX_LEN {
            return Err(ConfigError::InvalidValue {
                key: "run_id".to_string(),
                value: format!("run id longer than {} characters", Self::MAX_LEN),
            });
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(ConfigError::InvalidValue {
                key: "run_id".to_string(),
                value: format!("invalid character '{bad}' in run id '{trimmed}'"),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Approximate token accounting for one LLM call.
///
/// Counts are estimates derived from whitespace-delimited word counts divided
/// by 1.3, not tokenizer output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

impl TokenUsage {
    const WORDS_PER_TOKEN: f64 = 1.3;

    /// Estimate usage from the prompt and completion text.
    ///
    /// ```rust
    /// use uxpal_utils::types::TokenUsage;
    ///
    /// let usage = TokenUsage::estimate("one two three", "four five six seven");
    /// assert_eq!(usage.prompt, 2);
    /// assert_eq!(usage.completion, 3);
    /// assert_eq!(usage.total, 5);
    /// ```
    #[must_use]
    pub fn estimate(prompt: &str, completion: &str) -> Self {
        let prompt = Self::estimate_text(prompt);
        let completion = Self::estimate_text(completion);
        Self {
            prompt,
            completion,
            total: prompt + completion,
        }
    }

    fn estimate_text(text: &str) -> u64 {
        let words = text.split_whitespace().count() as f64;
        (words / Self::WORDS_PER_TOKEN).floor() as u64
    }

    /// Exact counts reported by a provider.
    #[must_use]
    pub fn reported(prompt: u64, completion: u64) -> Self {
        Self {
            prompt,
            completion,
            total: prompt + completion,
        }
    }
}

/// Where an effective configuration value came from.
///
/// ```rust
/// use uxpal_utils::types::ConfigSource;
///
/// let json = serde_json::to_string(&ConfigSource::Env).unwrap();
/// assert_eq!(json, r#""env""#);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Value provided via CLI argument (highest precedence).
    Cli,
    /// Value provided via environment variable.
    Env,
    /// Value loaded from configuration file.
    Config,
    /// Value provided programmatically (e.g., `Config::builder()`).
    Programmatic,
    /// Built-in default value (lowest precedence).
    Default,
}

impl ConfigSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Env => "env",
            Self::Config => "config",
            Self::Programmatic => "programmatic",
            Self::Default => "default",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generated_run_id_is_timestamp_shaped() {
        let id = RunId::generate();
        let parts: Vec<&str> = id.as_str().split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!((parts[0].len(), parts[1].len(), parts[2].len()), (8, 6, 3));
        assert!(parts[3].ends_with(|c: char| c.is_ascii_hexdigit()));
        assert!(RunId::parse(id.as_str()).is_ok());
    }

    #[test]
    fn test_generated_run_ids_are_distinct_within_one_instant() {
        let ids: std::collections::HashSet<RunId> = (0..200).map(|_| RunId::generate()).collect();
        assert_eq!(ids.len(), 200);
    }

    #[test]
    fn test_run_id_rejects_path_segments() {
        assert!(RunId::parse("a/b").is_err());
        assert!(RunId::parse("..").is_err());
        assert!(RunId::parse("   ").is_err());
        assert!(RunId::parse(&"x".repeat(65)).is_err());
        assert_eq!(RunId::parse(" run-1 ").unwrap().as_str(), "run-1");
    }

    #[test]
    fn test_token_estimate_empty_text() {
        assert_eq!(TokenUsage::estimate("", ""), TokenUsage::default());
    }

    proptest! {
        #[test]
        fn prop_token_total_is_sum(prompt in "[a-z ]{0,200}", completion in "[a-z ]{0,200}") {
            let usage = TokenUsage::estimate(&prompt, &completion);
            prop_assert_eq!(usage.total, usage.prompt + usage.completion);
            prop_assert!(usage.prompt <= prompt.split_whitespace().count() as u64);
        }
    }
}
