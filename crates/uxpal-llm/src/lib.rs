//! LLM backend abstraction for uxpal
//!
//! Every provider implements [`LlmBackend`], so the engine can run a pipeline
//! against Gemini, the offline placeholder, or a scripted test double without
//! knowing which one it has.

mod gemini_backend;
pub(crate) mod http_client;
mod placeholder_backend;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use placeholder_backend::{PLACEHOLDER_MARKER, PlaceholderBackend};
pub use types::{ImageInput, LlmBackend, LlmInvocation, LlmResult};
pub use uxpal_utils::error::LlmError;

use gemini_backend::GeminiBackend;
use std::sync::Arc;
use tracing::warn;
use uxpal_config::Config;

/// Create an LLM backend from configuration.
///
/// A `gemini` provider without an API key in the environment falls back to
/// the placeholder backend with a warning, so a run can still be exercised
/// end to end offline.
///
/// # Errors
///
/// Returns `LlmError::Unsupported` for unknown providers and
/// `LlmError::Misconfiguration` when the HTTP client cannot be built.
pub fn from_config(config: &Config) -> Result<Arc<dyn LlmBackend>, LlmError> {
    match config.llm_provider() {
        "placeholder" => Ok(Arc::new(PlaceholderBackend)),
        "gemini" => {
            let key_present = std::env::var(config.api_key_env())
                .map(|v| !v.trim().is_empty())
                .unwrap_or(false);
            if !key_present {
                warn!(
                    api_key_env = config.api_key_env(),
                    "No API key found; running in placeholder mode"
                );
                return Ok(Arc::new(PlaceholderBackend));
            }
            Ok(Arc::new(GeminiBackend::new_from_config(config)?))
        }
        unknown => Err(LlmError::Unsupported(format!(
            "Unknown LLM provider '{unknown}'. Supported providers: gemini, placeholder."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_placeholder_provider() {
        let config = Config::builder().llm_provider("placeholder").build().unwrap();
        let backend = from_config(&config).unwrap();
        assert_eq!(backend.provider_name(), "placeholder");
        assert!(!backend.uses_model());
    }

    #[test]
    #[serial]
    fn test_gemini_without_key_falls_back_to_placeholder() {
        let env_var = "UXPAL_GEMINI_KEY_TEST_FALLBACK";
        // SAFETY: serialized with other environment-mutating tests.
        unsafe {
            std::env::remove_var(env_var);
        }
        let config = Config::builder()
            .llm_provider("gemini")
            .api_key_env(env_var)
            .build()
            .unwrap();

        let backend = from_config(&config).unwrap();
        assert_eq!(backend.provider_name(), "placeholder");
    }

    #[test]
    #[serial]
    fn test_gemini_with_key_builds_http_backend() {
        let env_var = "UXPAL_GEMINI_KEY_TEST_PRESENT";
        // SAFETY: serialized with other environment-mutating tests.
        unsafe {
            std::env::set_var(env_var, "test-key");
        }
        let config = Config::builder()
            .llm_provider("gemini")
            .api_key_env(env_var)
            .build()
            .unwrap();

        let backend = from_config(&config);
        unsafe {
            std::env::remove_var(env_var);
        }

        let backend = backend.unwrap();
        assert_eq!(backend.provider_name(), "gemini");
        assert!(backend.supports_images());
        assert!(backend.uses_model());
    }
}
