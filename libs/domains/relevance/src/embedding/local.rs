use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fastembed::{InitOptions, TextEmbedding};
use once_cell::sync::Lazy;
use tracing::info;

use crate::config::VectorizationConfig;
use crate::embedding::provider::{
    EmbeddingMetadata, EmbeddingOutput, EmbeddingProvider, ensure_dimension,
};
use crate::error::{RelevanceError, RelevanceResult};

/// Process-wide model cache. Loading a model downloads weights and builds an
/// ONNX session, so concurrent loads of the same model must collapse into
/// one; the mutex is held across the load on purpose.
static MODEL_CACHE: Lazy<Mutex<HashMap<String, Arc<CachedModel>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

struct CachedModel {
    model: Mutex<TextEmbedding>,
    dimension: usize,
}

/// Evict all cached models. Exposed for tests and for reclaiming memory
/// after a provider switch.
pub fn clear_model_cache() {
    if let Ok(mut cache) = MODEL_CACHE.lock() {
        cache.clear();
    }
}

fn cache_dir() -> PathBuf {
    std::env::var("EMBEDDING_MODEL_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".fastembed_cache"))
}

fn parse_model_name(name: &str) -> RelevanceResult<fastembed::EmbeddingModel> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" | "bgelargeenv15" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        "multilingual-e5-base" => Ok(fastembed::EmbeddingModel::MultilingualE5Base),
        "multilingual-e5-large" => Ok(fastembed::EmbeddingModel::MultilingualE5Large),
        _ => Err(RelevanceError::Config(format!(
            "Unknown local model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, \
             bge-base-en-v1.5, bge-large-en-v1.5, multilingual-e5-small/base/large",
            name
        ))),
    }
}

fn load_model(name: &str) -> RelevanceResult<Arc<CachedModel>> {
    let mut cache = MODEL_CACHE
        .lock()
        .map_err(|_| RelevanceError::Internal("Model cache poisoned".to_string()))?;

    if let Some(cached) = cache.get(name) {
        return Ok(cached.clone());
    }

    let parsed = parse_model_name(name)?;
    let options = InitOptions::new(parsed)
        .with_cache_dir(cache_dir())
        .with_show_download_progress(false);

    info!(model = name, "Loading local embedding model");
    let mut model = TextEmbedding::try_new(options)
        .map_err(|e| RelevanceError::Embedding(format!("Failed to load model {}: {}", name, e)))?;

    // Probe encode: verifies the runtime actually works and reveals the
    // model's true dimension before the model is cached.
    let probe = model
        .embed(vec!["probe"], None)
        .map_err(|e| RelevanceError::Embedding(format!("Model probe failed: {}", e)))?;
    let dimension = probe
        .first()
        .map(Vec::len)
        .ok_or_else(|| RelevanceError::Embedding("Model probe returned nothing".to_string()))?;

    info!(model = name, dimension, "Local embedding model ready");
    let cached = Arc::new(CachedModel {
        model: Mutex::new(model),
        dimension,
    });
    cache.insert(name.to_string(), cached.clone());
    Ok(cached)
}

fn embed_blocking(model_name: &str, texts: Vec<String>) -> RelevanceResult<Vec<Vec<f32>>> {
    let cached = load_model(model_name)?;
    let mut model = cached
        .model
        .lock()
        .map_err(|_| RelevanceError::Internal("Model lock poisoned".to_string()))?;
    model
        .embed(texts, None)
        .map_err(|e| RelevanceError::Embedding(format!("Inference failed: {}", e)))
}

/// Local inference provider backed by fastembed (ONNX runtime).
///
/// Inference is CPU-bound and runs on the blocking thread pool.
pub struct LocalProvider {
    model_name: String,
    dimension: usize,
}

impl LocalProvider {
    pub fn from_config(config: &VectorizationConfig) -> RelevanceResult<Self> {
        // Fail fast on unknown models instead of at first embed.
        parse_model_name(&config.model)?;
        Ok(Self {
            model_name: config.model.clone(),
            dimension: config.dimension,
        })
    }

    async fn embed(&self, texts: Vec<String>) -> RelevanceResult<Vec<Vec<f32>>> {
        let model_name = self.model_name.clone();
        tokio::task::spawn_blocking(move || embed_blocking(&model_name, texts))
            .await
            .map_err(|e| RelevanceError::Internal(format!("Inference task panicked: {}", e)))?
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn provider_name(&self) -> &str {
        "local"
    }

    fn model(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn generate_embedding(&self, text: &str) -> RelevanceResult<EmbeddingOutput> {
        let mut outputs = self.generate_embeddings_batch(&[text.to_string()]).await?;
        outputs
            .pop()
            .ok_or_else(|| RelevanceError::Embedding("Model returned no embedding".to_string()))
    }

    async fn generate_embeddings_batch(
        &self,
        texts: &[String],
    ) -> RelevanceResult<Vec<EmbeddingOutput>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.embed(texts.to_vec()).await?;
        let mut outputs = Vec::with_capacity(vectors.len());
        for values in vectors {
            ensure_dimension(self.dimension, values.len())?;
            outputs.push(EmbeddingOutput {
                values,
                metadata: EmbeddingMetadata {
                    provider: "local".to_string(),
                    model: self.model_name.clone(),
                    dimension: self.dimension,
                    total_tokens: None,
                },
            });
        }
        Ok(outputs)
    }

    async fn close(&self) -> RelevanceResult<()> {
        // Models stay cached process-wide; eviction is explicit via
        // clear_model_cache.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_name() {
        assert!(parse_model_name("all-MiniLM-L6-v2").is_ok());
        assert!(parse_model_name("multilingual-e5-small").is_ok());
        assert!(matches!(
            parse_model_name("gpt-4"),
            Err(RelevanceError::Config(_))
        ));
    }

    #[test]
    fn test_from_config_rejects_unknown_model() {
        let config = VectorizationConfig {
            provider: "local".to_string(),
            model: "not-a-model".to_string(),
            ..VectorizationConfig::default()
        };
        assert!(LocalProvider::from_config(&config).is_err());
    }

    // Model download is too heavy for unit tests; loading and inference are
    // covered by the ignored test below.
    #[tokio::test]
    #[ignore = "requires model download"]
    async fn test_local_inference() {
        let config = VectorizationConfig {
            provider: "local".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 384,
            ..VectorizationConfig::default()
        };
        let provider = LocalProvider::from_config(&config).unwrap();
        let output = provider.generate_embedding("hello world").await.unwrap();
        assert_eq!(output.values.len(), 384);
        clear_model_cache();
    }
}
