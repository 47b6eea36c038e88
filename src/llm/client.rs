use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{ChatRequest, ChatResponse, Completion};
use crate::config::{LlmConfig, RequestConfig};
use crate::error::{LlmError, LlmResult};

/// A chat-completions provider.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Run one completion.
    async fn generate(&self, request: &ChatRequest) -> LlmResult<Completion>;
}

/// Client for an OpenAI-compatible chat-completions API
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: String,
    request_config: RequestConfig,
}

impl ChatClient {
    /// Create a new chat client
    pub fn new(config: &LlmConfig, request_config: RequestConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    /// Backoff before the given retry (1-based), capped.
    fn backoff(&self, retry: u32) -> Duration {
        let delay = self
            .request_config
            .retry_delay_ms
            .saturating_mul(2_u64.saturating_pow(retry.saturating_sub(1)));
        Duration::from_millis(delay.min(self.request_config.max_backoff_ms))
    }

    /// Execute a single request (internal)
    async fn execute_request(&self, url: &str, request: &ChatRequest) -> LlmResult<Completion> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            max_tokens = request.max_tokens,
            "Calling chat completions"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::RateLimited { message: body });
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let parsed: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse {
                    message: format!("Failed to parse response: {}", e),
                })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse {
                message: "Response contained no content".to_string(),
            })?;

        Ok(Completion::new(content, parsed.usage.unwrap_or_default()))
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LlmBackend for ChatClient {
    async fn generate(&self, request: &ChatRequest) -> LlmResult<Completion> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = self.backoff(retries);
                warn!(
                    model = %request.model,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying chat completion"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, request).await {
                Ok(completion) => {
                    info!(
                        model = %request.model,
                        latency_ms = start.elapsed().as_millis(),
                        total_tokens = completion.usage.total_tokens,
                        "Chat completion succeeded"
                    );
                    return Ok(completion);
                }
                Err(e) if !e.is_transient() => {
                    error!(model = %request.model, error = %e, "Chat completion rejected");
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        model = %request.model,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Chat completion failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        match last_error {
            Some(LlmError::RateLimited { message }) => Err(LlmError::RateLimited { message }),
            other => Err(LlmError::Unavailable {
                message: other
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Unknown error".to_string()),
                retries: retries.saturating_sub(1),
            }),
        }
    }
}
