use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::VectorizationConfig;
use crate::embedding::provider::{
    EmbeddingMetadata, EmbeddingOutput, EmbeddingProvider, ensure_dimension,
};
use crate::error::{RelevanceError, RelevanceResult};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible hosted embedding provider.
///
/// `base_url` makes this work against any OpenAI-compatible gateway.
/// Transport failures, 429 and 5xx responses are retried with exponential
/// backoff (1 s, 2 s, 4 s, ...) up to `max_retries`.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
    batch_size: usize,
    max_retries: u32,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

struct SendFailure {
    error: RelevanceError,
    retryable: bool,
}

impl OpenAiProvider {
    pub fn from_config(config: &VectorizationConfig) -> RelevanceResult<Self> {
        if config.api_key.is_empty() {
            return Err(RelevanceError::Config(
                "OpenAI provider requires an API key".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RelevanceError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config.model.clone(),
            dimension: config.dimension,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
        })
    }

    async fn send(&self, texts: &[String]) -> Result<EmbeddingResponse, SendFailure> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| SendFailure {
                error: RelevanceError::Embedding(format!("Request failed: {}", e)),
                retryable: true,
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(SendFailure {
                error: RelevanceError::Embedding(format!("Provider returned HTTP {}", status)),
                retryable: true,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SendFailure {
                error: RelevanceError::Embedding(format!(
                    "Provider returned HTTP {}: {}",
                    status, body
                )),
                retryable: false,
            });
        }

        response.json().await.map_err(|e| SendFailure {
            error: RelevanceError::Embedding(format!("Invalid response body: {}", e)),
            retryable: false,
        })
    }

    async fn request_with_retry(&self, texts: &[String]) -> RelevanceResult<EmbeddingResponse> {
        let mut attempt = 0;
        loop {
            match self.send(texts).await {
                Ok(response) => return Ok(response),
                Err(failure) if failure.retryable && attempt < self.max_retries => {
                    let backoff = Duration::from_secs(1 << attempt);
                    warn!(
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        error = %failure.error,
                        "Embedding request failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure.error),
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn generate_embedding(&self, text: &str) -> RelevanceResult<EmbeddingOutput> {
        let input = [text.to_string()];
        let mut outputs = self.generate_embeddings_batch(&input).await?;
        outputs.pop().ok_or_else(|| {
            RelevanceError::Embedding("Provider returned no embedding".to_string())
        })
    }

    async fn generate_embeddings_batch(
        &self,
        texts: &[String],
    ) -> RelevanceResult<Vec<EmbeddingOutput>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > self.batch_size {
            return Err(RelevanceError::Validation(format!(
                "Batch of {} exceeds maximum of {}",
                texts.len(),
                self.batch_size
            )));
        }

        let response = self.request_with_retry(texts).await?;
        if response.data.len() != texts.len() {
            return Err(RelevanceError::Embedding(format!(
                "Provider returned {} embeddings for {} inputs",
                response.data.len(),
                texts.len()
            )));
        }

        let total_tokens = response.usage.map(|u| u.total_tokens);
        debug!(count = texts.len(), ?total_tokens, "Generated embeddings");

        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        let mut outputs = Vec::with_capacity(data.len());
        for item in data {
            ensure_dimension(self.dimension, item.embedding.len())?;
            outputs.push(EmbeddingOutput {
                values: item.embedding,
                metadata: EmbeddingMetadata {
                    provider: "openai".to_string(),
                    model: self.model.clone(),
                    dimension: self.dimension,
                    total_tokens,
                },
            });
        }
        Ok(outputs)
    }

    async fn close(&self) -> RelevanceResult<()> {
        Ok(())
    }
}
