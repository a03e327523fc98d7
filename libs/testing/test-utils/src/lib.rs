//! Test Utilities
//!
//! Deterministic in-memory implementations of every external seam of the
//! relevance domain (vector store, entry/stats stores, config store, job
//! queue, embedding provider), plus a seeded data builder for reproducible
//! fixtures. Used by the domain crate's integration tests.

mod builders;
mod config_store;
mod providers;
mod queue;
mod stores;
mod vector_store;

pub use builders::TestDataBuilder;
pub use config_store::InMemoryConfigStore;
pub use providers::{FailingProvider, StaticProvider};
pub use queue::RecordingQueue;
pub use stores::{InMemoryEntryStore, InMemoryStatsStore};
pub use vector_store::InMemoryVectorStore;

// The process-local lock manager doubles as the test lock manager.
pub use domain_relevance::lock::LocalLockManager;
