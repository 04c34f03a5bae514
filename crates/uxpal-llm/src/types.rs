//! Core types for the LLM backend boundary

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::LlmError;

/// An image attached to a prompt (screenshots for visual critique).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImageInput {
    #[must_use]
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    #[must_use]
    pub fn png(data: Vec<u8>) -> Self {
        Self::new("image/png", data)
    }

    /// Standard base64 of the image bytes, as HTTP providers expect.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

/// Input to an LLM backend invocation
#[derive(Debug, Clone)]
pub struct LlmInvocation {
    /// Run the call belongs to, for log correlation
    pub run_id: String,
    /// Stage label, for log correlation
    pub stage: String,
    /// Model to use; empty means the backend default
    pub model: String,
    /// Upper bound for the whole call
    pub timeout: Duration,
    /// Fully composed prompt text
    pub prompt: String,
    /// Optional images sent alongside the prompt
    pub images: Vec<ImageInput>,
    /// Provider-specific parameters (`max_tokens`, `temperature`)
    pub metadata: HashMap<String, serde_json::Value>,
}

impl LlmInvocation {
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        stage: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            stage: stage.into(),
            model: model.into(),
            timeout,
            prompt: prompt.into(),
            images: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_image(mut self, image: ImageInput) -> Self {
        self.images.push(image);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Result from an LLM backend invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResult {
    /// Raw response text from the LLM
    pub raw_response: String,
    /// Provider name (e.g., "gemini", "placeholder")
    pub provider: String,
    /// Model that was actually used
    pub model_used: String,
    /// Prompt tokens reported by the provider
    pub tokens_input: Option<u64>,
    /// Completion tokens reported by the provider
    pub tokens_output: Option<u64>,
    /// Provider-specific extensions (e.g. `finish_reason`)
    pub extensions: HashMap<String, serde_json::Value>,
}

impl LlmResult {
    #[must_use]
    pub fn new(
        raw_response: impl Into<String>,
        provider: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            raw_response: raw_response.into(),
            provider: provider.into(),
            model_used: model_used.into(),
            tokens_input: None,
            tokens_output: None,
            extensions: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.tokens_input = Some(input);
        self.tokens_output = Some(output);
        self
    }

    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }
}

/// Trait for LLM backend implementations
///
/// The engine only sees this trait: `generate(prompt, images?) -> text` plus
/// optional usage counts.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Invoke the LLM with the given invocation parameters
    ///
    /// # Errors
    ///
    /// Returns `LlmError` for transport failures, provider errors (auth,
    /// quota, outages) and timeouts.
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError>;

    /// Short provider name used in logs and stage metadata.
    fn provider_name(&self) -> &'static str;

    /// Whether responses come from a real model.
    fn uses_model(&self) -> bool {
        true
    }

    /// Whether image inputs are forwarded to the model.
    fn supports_images(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_builder_collects_images_and_metadata() {
        let inv = LlmInvocation::new("r1", "UX UI Designer", "", Duration::from_secs(5), "hi")
            .with_image(ImageInput::png(vec![1, 2, 3]))
            .with_metadata("temperature", serde_json::json!(0.3));

        assert_eq!(inv.images.len(), 1);
        assert_eq!(inv.images[0].mime_type, "image/png");
        assert_eq!(inv.metadata["temperature"], serde_json::json!(0.3));
    }

    #[test]
    fn test_image_base64() {
        let image = ImageInput::png(b"hello".to_vec());
        assert_eq!(image.to_base64(), "aGVsbG8=");
    }

    #[test]
    fn test_result_with_tokens() {
        let result = LlmResult::new("text", "gemini", "gemini-1.5-flash").with_tokens(10, 20);
        assert_eq!(result.tokens_input, Some(10));
        assert_eq!(result.tokens_output, Some(20));
    }
}
