//! Shared HTTP client for HTTP-based LLM providers
//!
//! One `reqwest::Client` per backend, with connect/request timeouts and a
//! small retry policy for server errors and network failures.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::LlmError;

/// Default maximum HTTP timeout (5 minutes)
const DEFAULT_MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Default connect timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of retry attempts for 5xx and network failures
const MAX_RETRIES: u32 = 2;

/// Backoff unit; attempt `n` waits `n` units
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Arc<Client>,
    max_timeout: Duration,
}

impl HttpClient {
    pub fn new() -> Result<Self, LlmError> {
        Self::with_max_timeout(DEFAULT_MAX_HTTP_TIMEOUT)
    }

    pub fn with_max_timeout(max_timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()
            .map_err(|e| LlmError::Misconfiguration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client: Arc::new(client),
            max_timeout,
        })
    }

    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Execute a request with timeout and retry policy.
    ///
    /// - per-request timeout is `min(request_timeout, max_timeout)`
    /// - 5xx and network failures are retried up to twice (1s, 2s backoff)
    /// - 4xx responses are never retried
    pub async fn execute_with_retry(
        &self,
        request_builder: reqwest::RequestBuilder,
        request_timeout: Duration,
        provider_name: &str,
    ) -> Result<Response, LlmError> {
        let effective_timeout = request_timeout.min(self.max_timeout);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let request = request_builder
                .try_clone()
                .ok_or_else(|| LlmError::Transport("Failed to clone request for retry".to_string()))?
                .timeout(effective_timeout)
                .build()
                .map_err(|e| LlmError::Transport(format!("Failed to build request: {e}")))?;

            debug!(
                provider = provider_name,
                attempt,
                timeout_secs = effective_timeout.as_secs(),
                "Executing HTTP request"
            );

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_client_error() {
                        return Err(map_client_error(status, provider_name));
                    }

                    if status.is_server_error() {
                        if attempt <= MAX_RETRIES {
                            warn!(
                                provider = provider_name,
                                attempt,
                                status = status.as_u16(),
                                "Server error, will retry"
                            );
                            tokio::time::sleep(INITIAL_BACKOFF * attempt).await;
                            continue;
                        }
                        return Err(LlmError::ProviderOutage(format!(
                            "{provider_name} returned server error: {status}"
                        )));
                    }

                    return Ok(response);
                }
                Err(e) => {
                    if e.is_timeout() {
                        return Err(LlmError::Timeout {
                            duration: effective_timeout,
                        });
                    }

                    let message = redact_error_message(&e.to_string());
                    if attempt <= MAX_RETRIES {
                        warn!(
                            provider = provider_name,
                            attempt,
                            error = %message,
                            "Network error, will retry"
                        );
                        tokio::time::sleep(INITIAL_BACKOFF * attempt).await;
                        continue;
                    }

                    return Err(LlmError::Transport(format!(
                        "{provider_name} request failed: {message}"
                    )));
                }
            }
        }
    }
}

/// Map 4xx status codes to `LlmError` variants.
fn map_client_error(status: StatusCode, provider_name: &str) -> LlmError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LlmError::ProviderAuth(format!("{provider_name} authentication failed: {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            LlmError::ProviderQuota(format!("{provider_name} rate limit exceeded: {status}"))
        }
        _ => LlmError::Transport(format!("{provider_name} returned client error: {status}")),
    }
}

static URL_WITH_CREDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(https?://)[^:@\s/]+:[^@\s]+@").unwrap());

static KEY_QUERY_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([?&](?:key|api_key)=)[^&\s)]+").unwrap());

static POTENTIAL_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9_-])[A-Za-z0-9_-]{32,}(?:[^A-Za-z0-9_-]|$)").unwrap()
});

/// Strip credentials from an error message before it is logged or persisted.
///
/// Stage content embeds provider errors verbatim, so this runs before any
/// message leaves the client.
pub(crate) fn redact_error_message(message: &str) -> String {
    let redacted = URL_WITH_CREDS.replace_all(message, "$1[REDACTED]@");
    let redacted = KEY_QUERY_PARAM.replace_all(&redacted, "$1[REDACTED]");
    let redacted = POTENTIAL_KEY.replace_all(&redacted, "[REDACTED_KEY]");
    redacted.to_string()
}
