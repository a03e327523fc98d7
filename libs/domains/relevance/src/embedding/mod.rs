mod client;
mod local;
mod openai;
mod provider;
mod rate_limiter;
mod registry;

pub use client::EmbeddingClient;
pub use local::{LocalProvider, clear_model_cache};
pub use openai::OpenAiProvider;
pub use provider::{EmbeddingMetadata, EmbeddingOutput, EmbeddingProvider};
pub use rate_limiter::RateLimiter;
pub use registry::ProviderRegistry;

#[cfg(test)]
pub use provider::MockEmbeddingProvider;
