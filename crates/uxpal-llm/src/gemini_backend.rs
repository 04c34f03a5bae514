//! Gemini HTTP backend
//!
//! Calls the `generateContent` endpoint with one user turn made of a text part
//! and optional inline image parts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::LlmError;
use crate::http_client::HttpClient;
use crate::types::{ImageInput, LlmBackend, LlmInvocation, LlmResult};
use uxpal_config::Config;

/// Default Gemini models endpoint
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const PROVIDER: &str = "gemini";

#[derive(Clone)]
pub(crate) struct GeminiBackend {
    client: Arc<HttpClient>,
    base_url: String,
    api_key: String,
    default_model: String,
    default_params: HttpParams,
}

/// Generation parameters
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HttpParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GeminiBackend {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        default_model: String,
        default_params: HttpParams,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: Arc::new(HttpClient::new()?),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            default_model,
            default_params,
        })
    }

    /// Build the backend from configuration, reading the API key from the
    /// environment variable named by `[llm].api_key_env`.
    pub fn new_from_config(config: &Config) -> Result<Self, LlmError> {
        let api_key_env = config.api_key_env();
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                LlmError::Misconfiguration(format!(
                    "Gemini API key not found in environment variable '{api_key_env}'. \
                     Set it or configure a different api_key_env in [llm]."
                ))
            })?;

        let params = HttpParams {
            max_tokens: config.max_tokens(),
            temperature: config.temperature(),
        };

        Self::new(
            api_key,
            config.llm.base_url.clone(),
            config.llm_model().to_string(),
            params,
        )
    }

    /// `inv.model` and `inv.metadata` override the backend defaults.
    fn resolve_params(&self, inv: &LlmInvocation) -> (String, HttpParams) {
        let model = if inv.model.is_empty() {
            self.default_model.clone()
        } else {
            inv.model.clone()
        };

        let max_tokens = inv
            .metadata
            .get("max_tokens")
            .and_then(serde_json::Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(self.default_params.max_tokens);

        let temperature = inv
            .metadata
            .get("temperature")
            .and_then(serde_json::Value::as_f64)
            .map(|v| v as f32)
            .unwrap_or(self.default_params.temperature);

        (
            model,
            HttpParams {
                max_tokens,
                temperature,
            },
        )
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model.trim()
        )
    }

    fn build_request(prompt: &str, images: &[ImageInput], params: &HttpParams) -> GeminiRequest {
        let mut parts = vec![GeminiPart::text(prompt)];
        parts.extend(images.iter().map(GeminiPart::image));

        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_tokens,
            },
        }
    }

    fn response_text(response: &GeminiResponse) -> Result<String, LlmError> {
        let candidate = response.candidates.first().ok_or_else(|| {
            let reason = response
                .prompt_feedback
                .as_ref()
                .and_then(|f| f.block_reason.as_deref())
                .unwrap_or("no candidates returned");
            LlmError::Transport(format!("Gemini returned no candidates: {reason}"))
        })?;

        let text: String = candidate
            .content
            .as_ref()
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(LlmError::Transport(format!(
                "Gemini response missing text content (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        let (model, params) = self.resolve_params(&inv);

        debug!(
            provider = PROVIDER,
            run_id = %inv.run_id,
            stage = %inv.stage,
            model = %model,
            images = inv.images.len(),
            max_tokens = params.max_tokens,
            timeout_secs = inv.timeout.as_secs(),
            "Invoking Gemini backend"
        );

        let body = Self::build_request(&inv.prompt, &inv.images, &params);
        let request = self
            .client
            .inner()
            .post(self.endpoint(&model))
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body);

        let response = self
            .client
            .execute_with_retry(request, inv.timeout, PROVIDER)
            .await?;

        let response_body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("Failed to parse Gemini response: {e}")))?;

        let text = Self::response_text(&response_body)?;
        let mut result = LlmResult::new(text, PROVIDER, model);
        if let Some(usage) = &response_body.usage_metadata {
            result = result.with_tokens(
                usage.prompt_token_count.unwrap_or(0),
                usage.candidates_token_count.unwrap_or(0),
            );
        }
        if let Some(reason) = response_body
            .candidates
            .first()
            .and_then(|c| c.finish_reason.clone())
        {
            result = result.with_extension("finish_reason", serde_json::Value::String(reason));
        }

        debug!(
            provider = PROVIDER,
            tokens_input = ?result.tokens_input,
            tokens_output = ?result.tokens_output,
            "Gemini invocation completed"
        );

        Ok(result)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    fn supports_images(&self) -> bool {
        true
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

impl GeminiPart {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }

    fn image(image: &ImageInput) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: image.mime_type.clone(),
                data: image.to_base64(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;
    use std::time::Duration;

    fn backend() -> GeminiBackend {
        GeminiBackend::new(
            "test-key".to_string(),
            Some("https://example.test/models/".to_string()),
            "gemini-1.5-flash".to_string(),
            HttpParams {
                max_tokens: 1024,
                temperature: 0.5,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_params_defaults_and_overrides() {
        let backend = backend();
        let inv = LlmInvocation::new("r", "s", "", Duration::from_secs(60), "p");
        let (model, params) = backend.resolve_params(&inv);
        assert_eq!(model, "gemini-1.5-flash");
        assert_eq!(params.max_tokens, 1024);

        let inv = LlmInvocation::new("r", "s", "gemini-pro", Duration::from_secs(60), "p")
            .with_metadata("max_tokens", json!(2048))
            .with_metadata("temperature", json!(0.1));
        let (model, params) = backend.resolve_params(&inv);
        assert_eq!(model, "gemini-pro");
        assert_eq!(params.max_tokens, 2048);
        assert!((params.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        assert_eq!(
            backend().endpoint("gemini-1.5-flash"),
            "https://example.test/models/gemini-1.5-flash:generateContent"
        );
    }

    #[test]
    fn test_request_body_shape_with_image() {
        let params = HttpParams {
            max_tokens: 100,
            temperature: 0.5,
        };
        let body = GeminiBackend::build_request(
            "describe",
            &[ImageInput::png(b"hello".to_vec())],
            &params,
        );
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "describe");
        assert_eq!(
            value["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "image/png"
        );
        assert_eq!(
            value["contents"][0]["parts"][1]["inlineData"]["data"],
            "aGVsbG8="
        );
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 100);
        assert!(value["contents"][0]["parts"][0].get("inlineData").is_none());
    }

    #[test]
    fn test_response_text_joins_parts() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [{"text": "Hello "}, {"text": "world"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 2}
        }))
        .unwrap();
        assert_eq!(GeminiBackend::response_text(&response).unwrap(), "Hello world");
        assert_eq!(
            response.usage_metadata.as_ref().unwrap().prompt_token_count,
            Some(3)
        );
    }

    #[test]
    fn test_blocked_prompt_reports_reason() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        match GeminiBackend::response_text(&response) {
            Err(LlmError::Transport(msg)) => assert!(msg.contains("SAFETY")),
            other => panic!("Expected Transport error, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_new_from_config_missing_api_key() {
        let env_var = "UXPAL_GEMINI_KEY_TEST_MISSING";
        // SAFETY: serialized with other environment-mutating tests.
        unsafe {
            std::env::remove_var(env_var);
        }
        let config = Config::builder().api_key_env(env_var).build().unwrap();

        match GeminiBackend::new_from_config(&config) {
            Err(LlmError::Misconfiguration(msg)) => {
                assert!(msg.contains(env_var));
                assert!(msg.contains("not found"));
            }
            Err(other) => panic!("Expected Misconfiguration, got {other:?}"),
            Ok(_) => panic!("Expected Misconfiguration, got a backend"),
        }
    }
}
