use std::collections::HashMap;

use async_trait::async_trait;
use domain_relevance::embedding::{EmbeddingMetadata, EmbeddingOutput, EmbeddingProvider};
use domain_relevance::error::{RelevanceError, RelevanceResult};
use tokio::sync::Mutex;

/// Deterministic embedding provider: each text maps to a stable unit vector
/// derived from its bytes, optionally overridden per text with
/// [`StaticProvider::set_vector`]. Identical texts always embed identically.
pub struct StaticProvider {
    dimension: usize,
    overrides: Mutex<HashMap<String, Vec<f32>>>,
    calls: Mutex<u32>,
}

impl StaticProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            overrides: Mutex::new(HashMap::new()),
            calls: Mutex::new(0),
        }
    }

    /// Pin the vector returned for an exact text.
    pub async fn set_vector(&self, text: &str, vector: Vec<f32>) {
        self.overrides.lock().await.insert(text.to_string(), vector);
    }

    pub async fn call_count(&self) -> u32 {
        *self.calls.lock().await
    }

    fn derive(&self, text: &str) -> Vec<f32> {
        // Simple splitmix-style stream seeded by the text bytes
        let mut state = 0xcbf29ce484222325u64;
        for b in text.bytes() {
            state = (state ^ u64::from(b)).wrapping_mul(0x100000001b3);
        }

        let mut values = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let unit = (state >> 40) as f32 / (1u64 << 24) as f32;
            values.push(unit * 2.0 - 1.0);
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in values.iter_mut() {
                *v /= norm;
            }
        }
        values
    }

    async fn embed_one(&self, text: &str) -> EmbeddingOutput {
        *self.calls.lock().await += 1;
        let values = match self.overrides.lock().await.get(text) {
            Some(vector) => vector.clone(),
            None => self.derive(text),
        };
        EmbeddingOutput {
            values,
            metadata: EmbeddingMetadata {
                provider: "static".to_string(),
                model: "static-test".to_string(),
                dimension: self.dimension,
                total_tokens: None,
            },
        }
    }
}

#[async_trait]
impl EmbeddingProvider for StaticProvider {
    fn provider_name(&self) -> &str {
        "static"
    }

    fn model(&self) -> &str {
        "static-test"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn generate_embedding(&self, text: &str) -> RelevanceResult<EmbeddingOutput> {
        Ok(self.embed_one(text).await)
    }

    async fn generate_embeddings_batch(
        &self,
        texts: &[String],
    ) -> RelevanceResult<Vec<EmbeddingOutput>> {
        let mut outputs = Vec::with_capacity(texts.len());
        for text in texts {
            outputs.push(self.embed_one(text).await);
        }
        Ok(outputs)
    }

    async fn close(&self) -> RelevanceResult<()> {
        Ok(())
    }
}

/// Provider whose every call fails, for breaker and error-path tests.
pub struct FailingProvider {
    dimension: usize,
    message: String,
}

impl FailingProvider {
    pub fn new(dimension: usize, message: &str) -> Self {
        Self {
            dimension,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    fn provider_name(&self) -> &str {
        "failing"
    }

    fn model(&self) -> &str {
        "failing-test"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn generate_embedding(&self, _text: &str) -> RelevanceResult<EmbeddingOutput> {
        Err(RelevanceError::Embedding(self.message.clone()))
    }

    async fn generate_embeddings_batch(
        &self,
        _texts: &[String],
    ) -> RelevanceResult<Vec<EmbeddingOutput>> {
        Err(RelevanceError::Embedding(self.message.clone()))
    }

    async fn close(&self) -> RelevanceResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_is_deterministic_and_unit_norm() {
        let provider = StaticProvider::new(16);
        let a = provider.generate_embedding("hello").await.unwrap();
        let b = provider.generate_embedding("hello").await.unwrap();
        let c = provider.generate_embedding("other").await.unwrap();

        assert_eq!(a.values, b.values);
        assert_ne!(a.values, c.values);

        let norm = a.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(provider.call_count().await, 3);
    }
}
