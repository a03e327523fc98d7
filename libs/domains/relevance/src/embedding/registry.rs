use std::collections::HashMap;
use std::sync::Arc;

use crate::config::VectorizationConfig;
use crate::embedding::local::LocalProvider;
use crate::embedding::openai::OpenAiProvider;
use crate::embedding::provider::EmbeddingProvider;
use crate::error::{RelevanceError, RelevanceResult};

type ProviderFactory = fn(&VectorizationConfig) -> RelevanceResult<Arc<dyn EmbeddingProvider>>;

/// Explicit name → constructor map for embedding providers.
///
/// Providers are registered at startup; an unknown name is a configuration
/// error that lists what is available.
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

fn openai_factory(config: &VectorizationConfig) -> RelevanceResult<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(OpenAiProvider::from_config(config)?))
}

fn local_factory(config: &VectorizationConfig) -> RelevanceResult<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(LocalProvider::from_config(config)?))
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in providers: `openai` and `local` (alias
    /// `fastembed`).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("openai", openai_factory);
        registry.register("local", local_factory);
        registry.register("fastembed", local_factory);
        registry
    }

    pub fn register(&mut self, name: &str, factory: ProviderFactory) {
        self.factories.insert(name.to_lowercase(), factory);
    }

    /// Construct the provider named by `config.provider`.
    pub fn create(
        &self,
        config: &VectorizationConfig,
    ) -> RelevanceResult<Arc<dyn EmbeddingProvider>> {
        let name = config.provider.to_lowercase();
        let factory = self.factories.get(&name).ok_or_else(|| {
            RelevanceError::Config(format!(
                "Unknown embedding provider '{}'. Available: {}",
                config.provider,
                self.names().join(", ")
            ))
        })?;
        factory(config)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_names() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["fastembed", "local", "openai"]);
    }

    #[test]
    fn test_unknown_provider_lists_available() {
        let registry = ProviderRegistry::with_defaults();
        let config = VectorizationConfig {
            provider: "volcano".to_string(),
            ..VectorizationConfig::default()
        };
        let err = registry.create(&config).unwrap_err();
        assert!(err.to_string().contains("volcano"));
        assert!(err.to_string().contains("openai"));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = ProviderRegistry::with_defaults();
        let config = VectorizationConfig {
            provider: "OpenAI".to_string(),
            api_key: "sk-test".to_string(),
            ..VectorizationConfig::default()
        };
        let provider = registry.create(&config).unwrap();
        assert_eq!(provider.provider_name(), "openai");
    }

    #[test]
    fn test_custom_registration() {
        fn failing(_: &VectorizationConfig) -> RelevanceResult<Arc<dyn EmbeddingProvider>> {
            Err(RelevanceError::Config("not wired".to_string()))
        }

        let mut registry = ProviderRegistry::new();
        registry.register("custom", failing);
        assert_eq!(registry.names(), vec!["custom"]);
    }
}
