use async_trait::async_trait;

use crate::error::{RelevanceError, RelevanceResult};

/// Metadata attached to a generated embedding
#[derive(Debug, Clone)]
pub struct EmbeddingMetadata {
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    /// Token usage reported by the provider for the whole request, when
    /// available.
    pub total_tokens: Option<u32>,
}

/// A generated embedding with its metadata
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub values: Vec<f32>,
    pub metadata: EmbeddingMetadata,
}

/// Trait for embedding generation backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Registry name of this provider.
    fn provider_name(&self) -> &str;

    /// Model identifier in use.
    fn model(&self) -> &str;

    /// Configured output dimension. Every returned vector is validated
    /// against it.
    fn dimension(&self) -> usize;

    /// Generate an embedding for one text.
    async fn generate_embedding(&self, text: &str) -> RelevanceResult<EmbeddingOutput>;

    /// Generate embeddings for several texts, in input order.
    async fn generate_embeddings_batch(
        &self,
        texts: &[String],
    ) -> RelevanceResult<Vec<EmbeddingOutput>>;

    /// Release backend resources.
    async fn close(&self) -> RelevanceResult<()>;
}

impl std::fmt::Debug for dyn EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingProvider")
            .field("provider", &self.provider_name())
            .field("model", &self.model())
            .finish()
    }
}

/// Shared dimension check applied by every provider implementation.
/// An expected dimension of 0 disables the check (used when probing a
/// provider to discover its true dimension).
pub(crate) fn ensure_dimension(expected: usize, actual: usize) -> RelevanceResult<()> {
    if expected != 0 && expected != actual {
        return Err(RelevanceError::Embedding(format!(
            "Dimension mismatch: expected {}, provider returned {}",
            expected, actual
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_dimension() {
        assert!(ensure_dimension(1536, 1536).is_ok());
        assert!(ensure_dimension(0, 384).is_ok());

        let err = ensure_dimension(1536, 384).unwrap_err();
        assert!(err.to_string().contains("expected 1536"));
    }
}
