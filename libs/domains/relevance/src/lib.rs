//! Relevance Domain Library
//!
//! Vectorization and preference learning for feed entries: entries are
//! embedded into a vector store, per-user preference vectors are folded from
//! feedback signals, and entries are scored 0-100 against those vectors in
//! real time. A persisted state machine with a circuit breaker governs the
//! whole subsystem.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐ ┌───────────────────┐ ┌──────────────┐
//! │ EmbeddingService │ │ PreferenceService │ │ ScoreService │
//! └────────┬─────────┘ └────────┬──────────┘ └──────┬───────┘
//!          │                    │                   │
//!          └──────────┬─────────┴───────────────────┘
//!                     │
//!          ┌──────────▼──────────┐      ┌───────────────────┐
//!          │  VectorRepository   │      │ EmbeddingProvider │
//!          │      (trait)        │      │      (trait)      │
//!          └──────────┬──────────┘      └─────────┬─────────┘
//!                     │                           │
//!          ┌──────────▼──────────┐      ┌─────────▼─────────┐
//!          │  MilvusRepository   │      │  OpenAiProvider   │
//!          │  (REST v2 client)   │      │  LocalProvider    │
//!          └─────────────────────┘      └───────────────────┘
//! ```
//!
//! The relational store (entries, stats), config persistence, locking and
//! the job queue transport are all trait seams ([`EntryStore`],
//! [`PreferenceStatsStore`], [`ConfigStore`], [`LockManager`], [`JobQueue`])
//! implemented by the hosting application.
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_relevance::{
//!     Job, JobContext, MilvusRepository, ProviderRegistry, RedisLockManager, run_job,
//! };
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! # async fn example(
//! #     entries: Arc<dyn domain_relevance::EntryStore>,
//! #     stats: Arc<dyn domain_relevance::PreferenceStatsStore>,
//! #     config: Arc<dyn domain_relevance::ConfigStore>,
//! #     queue: Arc<dyn domain_relevance::JobQueue>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = JobContext {
//!     repository: Arc::new(MilvusRepository::from_env()?),
//!     entries,
//!     stats,
//!     config,
//!     locks: Arc::new(RedisLockManager::connect("redis://127.0.0.1/").await?),
//!     queue,
//!     registry: Arc::new(ProviderRegistry::with_defaults()),
//! };
//!
//! let outcome = run_job(
//!     &ctx,
//!     Job::GenerateEntryEmbedding { entry_id: Uuid::new_v4() },
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod jobs;
pub mod lifecycle;
pub mod lock;
pub mod milvus;
pub mod models;
pub mod repository;
pub mod services;
pub mod store;

// Re-export commonly used types
pub use config::{
    ConfigStore, ConfigUpdate, RateLimitConfig, VectorizationConfig, VectorizationStatus,
};
pub use embedding::{
    EmbeddingClient, EmbeddingOutput, EmbeddingProvider, LocalProvider, OpenAiProvider,
    ProviderRegistry, RateLimiter,
};
pub use error::{RelevanceError, RelevanceResult};
pub use jobs::{Job, JobContext, JobOutcome, JobQueue, run_job};
pub use lifecycle::{CONSECUTIVE_FAILURE_THRESHOLD, StatusSnapshot, VectorizationLifecycle};
pub use lock::{LocalLockManager, LockGuard, LockManager, RedisLockManager};
pub use milvus::{MilvusConfig, MilvusRepository};
pub use models::{
    AffinityCounts, CollectionSpec, EmbeddingCounts, EmbeddingStatus, Entry, EntryVector,
    FeedbackEvent, Polarity, PreferenceStats, PreferenceStrength, PreferenceVector,
    ScoreBreakdown, ScoreReason, SearchFilters, SearchHit, SignalType, UserPreferences,
};
pub use repository::VectorRepository;
pub use services::{
    BatchStats, EmbeddingService, PreferenceService, ScoreService, ScoringParams,
    VALIDATION_TEXT, ValidationOutcome, ValidationService,
};
pub use store::{EntryStore, PreferenceStatsStore};
