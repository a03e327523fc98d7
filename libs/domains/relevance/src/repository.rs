use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RelevanceResult;
use crate::models::{
    CollectionSpec, EntryVector, PreferenceVector, SearchFilters, SearchHit, UserPreferences,
};

/// Repository trait for vector storage operations
///
/// Abstracts the vector store so services and job handlers can run against
/// mocks and in-memory fakes. The production implementation is
/// [`crate::milvus::MilvusRepository`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VectorRepository: Send + Sync {
    /// Ensure both collections exist and match `spec`'s signature.
    /// A signature mismatch recreates them, discarding all vectors.
    async fn ensure_collections(&self, spec: &CollectionSpec) -> RelevanceResult<()>;

    /// Drop and recreate both collections for `spec`.
    async fn recreate_collections(&self, spec: &CollectionSpec) -> RelevanceResult<()>;

    /// Cheap reachability probe.
    async fn ping(&self) -> RelevanceResult<()>;

    /// Upsert one entry vector (replaces any existing row for the entry).
    async fn insert_entry_embedding(&self, vector: &EntryVector) -> RelevanceResult<()>;

    /// Fetch one entry's embedding, if stored.
    async fn get_entry_embedding(&self, entry_id: Uuid) -> RelevanceResult<Option<Vec<f32>>>;

    /// Fetch embeddings for many entries in one round trip. Missing ids are
    /// simply absent from the result.
    async fn batch_get_entry_embeddings(
        &self,
        entry_ids: &[Uuid],
    ) -> RelevanceResult<HashMap<Uuid, Vec<f32>>>;

    /// Cosine similarity search over entry vectors.
    async fn search_similar_entries<'a>(
        &self,
        query: &[f32],
        top_k: usize,
        filters: Option<&'a SearchFilters>,
    ) -> RelevanceResult<Vec<SearchHit>>;

    /// Upsert one polarity of a user's preference model.
    async fn upsert_user_preference(&self, pref: &PreferenceVector) -> RelevanceResult<()>;

    /// Fetch both polarities of a user's preference model.
    async fn get_user_preferences(&self, user_id: Uuid) -> RelevanceResult<UserPreferences>;

    /// Delete one entry's vector. Deleting a missing row is not an error.
    async fn delete_entry_embedding(&self, entry_id: Uuid) -> RelevanceResult<()>;

    /// Delete both of a user's preference vectors.
    async fn delete_user_preferences(&self, user_id: Uuid) -> RelevanceResult<()>;
}
