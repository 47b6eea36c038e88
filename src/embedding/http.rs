use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::EmbeddingBackend;
use crate::config::{EmbeddingConfig, RequestConfig};
use crate::error::{EmbeddingError, EmbeddingResult};

/// Request body for an OpenAI-compatible embeddings endpoint
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

/// Embedding backend talking to `{base_url}/v1/embeddings`.
#[derive(Clone)]
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model_id: String,
    dimension: usize,
    request_config: RequestConfig,
}

impl HttpEmbedder {
    /// Create a new HTTP embedding client
    pub fn new(config: &EmbeddingConfig, request_config: RequestConfig) -> EmbeddingResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(EmbeddingError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model_id: config.model_id.clone(),
            dimension: config.dimension,
            request_config,
        })
    }

    async fn execute_request(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        debug!(model = %self.model_id, texts = texts.len(), "Requesting embeddings");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&EmbeddingRequest {
                model: &self.model_id,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Unavailable {
                message: format!("{} - {}", status.as_u16(), body),
            });
        }

        let mut parsed: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| EmbeddingError::InvalidResponse {
                    message: format!("Failed to parse embeddings: {}", e),
                })?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse {
                message: format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    parsed.data.len()
                ),
            });
        }

        parsed.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut retries = 0;
        loop {
            match self.execute_request(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e @ EmbeddingError::DimensionMismatch { .. }) => return Err(e),
                Err(e) if retries >= self.request_config.max_retries => {
                    return Err(EmbeddingError::Unavailable {
                        message: format!("{} (retries: {})", e, retries),
                    })
                }
                Err(e) => {
                    retries += 1;
                    let delay = (self.request_config.retry_delay_ms
                        * 2_u64.pow(retries - 1))
                    .min(self.request_config.max_backoff_ms);
                    warn!(
                        error = %e,
                        retry = retries,
                        delay_ms = delay,
                        "Retrying embedding request"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }
}
