use std::sync::Arc;

use tracing::{info, warn};

use crate::config::VectorizationConfig;
use crate::embedding::ProviderRegistry;
use crate::error::RelevanceResult;
use crate::repository::VectorRepository;

/// Sentence embedded to prove a provider configuration actually works.
pub const VALIDATION_TEXT: &str = "This is a test sentence for embedding validation.";

/// Result of one validation probe
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub success: bool,
    pub message: String,
    pub dimension: Option<usize>,
}

impl ValidationOutcome {
    fn ok(message: impl Into<String>, dimension: Option<usize>) -> Self {
        Self {
            success: true,
            message: message.into(),
            dimension,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            dimension: None,
        }
    }
}

/// Probes a configuration before it is allowed to drive a rebuild: the
/// provider must embed a test sentence at the configured dimension and the
/// vector store must answer.
pub struct ValidationService {
    registry: Arc<ProviderRegistry>,
}

impl ValidationService {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// End-to-end provider check: construct, embed the test sentence,
    /// verify the dimension, close.
    pub async fn validate_provider(&self, config: &VectorizationConfig) -> ValidationOutcome {
        let provider = match self.registry.create(config) {
            Ok(provider) => provider,
            Err(e) => {
                warn!(provider = %config.provider, error = %e, "Provider construction failed");
                return ValidationOutcome::fail(e.to_string());
            }
        };

        let result = provider.generate_embedding(VALIDATION_TEXT).await;
        if let Err(e) = provider.close().await {
            warn!(error = %e, "Provider close failed after validation");
        }

        match result {
            Ok(output) => {
                let dimension = output.values.len();
                info!(
                    provider = %config.provider,
                    model = %config.model,
                    dimension,
                    "Provider validation passed"
                );
                ValidationOutcome::ok(
                    format!(
                        "Provider {} validated with model {} ({} dimensions)",
                        config.provider, config.model, dimension
                    ),
                    Some(dimension),
                )
            }
            Err(e) => {
                warn!(provider = %config.provider, error = %e, "Provider validation failed");
                ValidationOutcome::fail(e.to_string())
            }
        }
    }

    /// Vector store reachability probe.
    pub async fn validate_store(&self, repository: &dyn VectorRepository) -> ValidationOutcome {
        match repository.ping().await {
            Ok(()) => ValidationOutcome::ok("Vector store reachable", None),
            Err(e) => {
                warn!(error = %e, "Vector store validation failed");
                ValidationOutcome::fail(format!("Vector store unreachable: {}", e))
            }
        }
    }

    /// Discover the provider's actual output dimension by probing with the
    /// dimension check disabled.
    pub async fn infer_dimension(&self, config: &VectorizationConfig) -> RelevanceResult<usize> {
        let mut probe_config = config.clone();
        probe_config.dimension = 0;

        let provider = self.registry.create(&probe_config)?;
        let result = provider.generate_embedding(VALIDATION_TEXT).await;
        if let Err(e) = provider.close().await {
            warn!(error = %e, "Provider close failed after probe");
        }
        Ok(result?.values.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelevanceError;
    use crate::repository::MockVectorRepository;

    fn registry() -> ValidationService {
        ValidationService::new(Arc::new(ProviderRegistry::with_defaults()))
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_validation() {
        let config = VectorizationConfig {
            provider: "nope".to_string(),
            ..VectorizationConfig::default()
        };
        let outcome = registry().validate_provider(&config).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("nope"));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_validation() {
        let outcome = registry()
            .validate_provider(&VectorizationConfig::default())
            .await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("API key"));
    }

    #[tokio::test]
    async fn test_store_probe() {
        let mut repo = MockVectorRepository::new();
        repo.expect_ping().times(1).returning(|| Ok(()));
        let outcome = registry().validate_store(&repo).await;
        assert!(outcome.success);

        let mut repo = MockVectorRepository::new();
        repo.expect_ping()
            .returning(|| Err(RelevanceError::Store("down".to_string())));
        let outcome = registry().validate_store(&repo).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("down"));
    }
}
