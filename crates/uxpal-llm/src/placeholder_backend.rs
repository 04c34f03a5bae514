//! Offline backend used when no API key is configured
//!
//! Echoes the beginning of the prompt so a run still produces every artifact.

use async_trait::async_trait;

use crate::LlmError;
use crate::types::{LlmBackend, LlmInvocation, LlmResult};

const PROVIDER: &str = "placeholder";
const PROMPT_PREVIEW_CHARS: usize = 200;

/// Marker that opens every placeholder response.
pub const PLACEHOLDER_MARKER: &str = "[PLACEHOLDER RESPONSE - No AI client available]";

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderBackend;

impl PlaceholderBackend {
    /// The text returned for `prompt`.
    #[must_use]
    pub fn response_for(prompt: &str) -> String {
        let preview: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
        format!("{PLACEHOLDER_MARKER}\n\nPrompt was: {preview}...")
    }
}

#[async_trait]
impl LlmBackend for PlaceholderBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        Ok(LlmResult::new(
            Self::response_for(&inv.prompt),
            PROVIDER,
            "none",
        ))
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    fn uses_model(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_placeholder_echoes_prompt_prefix() {
        let prompt = "x".repeat(500);
        let inv = LlmInvocation::new("r", "s", "", Duration::from_secs(1), prompt);
        let result = PlaceholderBackend.invoke(inv).await.unwrap();

        assert!(result.raw_response.starts_with(PLACEHOLDER_MARKER));
        assert!(result.raw_response.ends_with(&format!("{}...", "x".repeat(200))));
        assert!(!PlaceholderBackend.uses_model());
    }

    #[test]
    fn test_short_prompt_is_not_padded() {
        assert_eq!(
            PlaceholderBackend::response_for("hi"),
            format!("{PLACEHOLDER_MARKER}\n\nPrompt was: hi...")
        );
    }
}
