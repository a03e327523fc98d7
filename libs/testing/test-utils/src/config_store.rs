use async_trait::async_trait;
use domain_relevance::config::{ConfigStore, VectorizationConfig};
use domain_relevance::error::RelevanceResult;
use tokio::sync::Mutex;

/// Config store over a shared in-memory record.
pub struct InMemoryConfigStore {
    config: Mutex<VectorizationConfig>,
}

impl InMemoryConfigStore {
    pub fn new(config: VectorizationConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }

    /// An enabled, idle config with the given provider settings.
    pub fn operational(provider: &str, model: &str, dimension: usize) -> Self {
        let mut config = VectorizationConfig {
            provider: provider.to_string(),
            model: model.to_string(),
            dimension,
            ..VectorizationConfig::default()
        };
        config.enabled = true;
        config.status = domain_relevance::config::VectorizationStatus::Idle;
        Self::new(config)
    }

    pub async fn snapshot(&self) -> VectorizationConfig {
        self.config.lock().await.clone()
    }
}

impl Default for InMemoryConfigStore {
    fn default() -> Self {
        Self::new(VectorizationConfig::default())
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn load(&self) -> RelevanceResult<VectorizationConfig> {
        Ok(self.config.lock().await.clone())
    }

    async fn store(&self, config: &VectorizationConfig) -> RelevanceResult<()> {
        *self.config.lock().await = config.clone();
        Ok(())
    }
}
