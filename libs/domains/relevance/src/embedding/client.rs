use std::sync::Arc;

use crate::config::VectorizationConfig;
use crate::embedding::provider::{EmbeddingOutput, EmbeddingProvider};
use crate::embedding::rate_limiter::RateLimiter;
use crate::embedding::registry::ProviderRegistry;
use crate::error::RelevanceResult;

/// Provider façade that applies rate limiting before every call.
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    limiter: Option<RateLimiter>,
}

impl EmbeddingClient {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, max_per_minute: u32) -> Self {
        let limiter = (max_per_minute > 0).then(|| RateLimiter::new(max_per_minute));
        Self { provider, limiter }
    }

    /// Build a client for the configured provider with its configured rpm.
    pub fn from_config(
        registry: &ProviderRegistry,
        config: &VectorizationConfig,
    ) -> RelevanceResult<Self> {
        let provider = registry.create(config)?;
        Ok(Self::new(provider, config.rate_limit_rpm()))
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub async fn generate_embedding(&self, text: &str) -> RelevanceResult<EmbeddingOutput> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
        self.provider.generate_embedding(text).await
    }

    pub async fn generate_embeddings_batch(
        &self,
        texts: &[String],
    ) -> RelevanceResult<Vec<EmbeddingOutput>> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }
        self.provider.generate_embeddings_batch(texts).await
    }

    pub async fn close(&self) -> RelevanceResult<()> {
        self.provider.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::provider::{EmbeddingMetadata, MockEmbeddingProvider};

    fn stub_output(dimension: usize) -> EmbeddingOutput {
        EmbeddingOutput {
            values: vec![0.0; dimension],
            metadata: EmbeddingMetadata {
                provider: "mock".to_string(),
                model: "mock-model".to_string(),
                dimension,
                total_tokens: None,
            },
        }
    }

    #[tokio::test]
    async fn test_delegates_to_provider() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_generate_embedding()
            .times(1)
            .returning(|_| Ok(stub_output(4)));

        let client = EmbeddingClient::new(Arc::new(provider), 0);
        let output = client.generate_embedding("hello").await.unwrap();
        assert_eq!(output.values.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_applies_between_calls() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_generate_embedding()
            .times(2)
            .returning(|_| Ok(stub_output(4)));

        let client = EmbeddingClient::new(Arc::new(provider), 1);
        let start = tokio::time::Instant::now();
        client.generate_embedding("a").await.unwrap();
        client.generate_embedding("b").await.unwrap();
        // Second call waited out the window
        assert!(start.elapsed() >= std::time::Duration::from_secs(60));
    }
}
