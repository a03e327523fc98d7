use std::collections::HashMap;

use async_trait::async_trait;
use domain_relevance::error::RelevanceResult;
use domain_relevance::models::{
    CollectionSpec, EntryVector, Polarity, PreferenceVector, SearchFilters, SearchHit,
    UserPreferences,
};
use domain_relevance::repository::VectorRepository;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    signature: Option<String>,
    entries: HashMap<Uuid, EntryVector>,
    preferences: HashMap<String, PreferenceVector>,
    recreate_count: u32,
    preference_fetches: u32,
}

/// In-memory vector store with the same contract as the Milvus repository:
/// signature tracking with recreate-on-mismatch, cosine search, upserts.
#[derive(Default)]
pub struct InMemoryVectorStore {
    inner: Mutex<Inner>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entry_count(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn preference_count(&self) -> usize {
        self.inner.lock().await.preferences.len()
    }

    /// How many times the collections were dropped and recreated.
    pub async fn recreate_count(&self) -> u32 {
        self.inner.lock().await.recreate_count
    }

    /// How many whole-model preference fetches were served (for verifying
    /// batch paths fetch once).
    pub async fn preference_fetches(&self) -> u32 {
        self.inner.lock().await.preference_fetches
    }

    pub async fn stored_signature(&self) -> Option<String> {
        self.inner.lock().await.signature.clone()
    }

    pub async fn preference(&self, user_id: Uuid, polarity: Polarity) -> Option<PreferenceVector> {
        let key = format!("{}_{}", user_id, polarity.as_str());
        self.inner.lock().await.preferences.get(&key).cloned()
    }

    /// Store a vector directly, bypassing the embedding pipeline.
    pub async fn seed_entry(&self, vector: EntryVector) {
        self.inner.lock().await.entries.insert(vector.entry_id, vector);
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

fn matches_filters(vector: &EntryVector, filters: Option<&SearchFilters>) -> bool {
    let Some(filters) = filters else { return true };
    if let Some(feed_id) = filters.feed_id {
        if vector.feed_id != feed_id {
            return false;
        }
    }
    if let Some(min) = filters.min_published_at {
        if vector.published_at < min.timestamp() {
            return false;
        }
    }
    true
}

#[async_trait]
impl VectorRepository for InMemoryVectorStore {
    async fn ensure_collections(&self, spec: &CollectionSpec) -> RelevanceResult<()> {
        let mut inner = self.inner.lock().await;
        let signature = spec.signature();
        match &inner.signature {
            Some(stored) if *stored == signature => {}
            Some(_) => {
                // Signature mismatch behaves like the real store: recreate
                inner.entries.clear();
                inner.preferences.clear();
                inner.recreate_count += 1;
                inner.signature = Some(signature);
            }
            None => inner.signature = Some(signature),
        }
        Ok(())
    }

    async fn recreate_collections(&self, spec: &CollectionSpec) -> RelevanceResult<()> {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.preferences.clear();
        inner.recreate_count += 1;
        inner.signature = Some(spec.signature());
        Ok(())
    }

    async fn ping(&self) -> RelevanceResult<()> {
        Ok(())
    }

    async fn insert_entry_embedding(&self, vector: &EntryVector) -> RelevanceResult<()> {
        self.inner
            .lock()
            .await
            .entries
            .insert(vector.entry_id, vector.clone());
        Ok(())
    }

    async fn get_entry_embedding(&self, entry_id: Uuid) -> RelevanceResult<Option<Vec<f32>>> {
        Ok(self
            .inner
            .lock()
            .await
            .entries
            .get(&entry_id)
            .map(|v| v.embedding.clone()))
    }

    async fn batch_get_entry_embeddings(
        &self,
        entry_ids: &[Uuid],
    ) -> RelevanceResult<HashMap<Uuid, Vec<f32>>> {
        let inner = self.inner.lock().await;
        Ok(entry_ids
            .iter()
            .filter_map(|id| inner.entries.get(id).map(|v| (*id, v.embedding.clone())))
            .collect())
    }

    async fn search_similar_entries<'a>(
        &self,
        query: &[f32],
        top_k: usize,
        filters: Option<&'a SearchFilters>,
    ) -> RelevanceResult<Vec<SearchHit>> {
        let inner = self.inner.lock().await;
        let mut hits: Vec<SearchHit> = inner
            .entries
            .values()
            .filter(|v| matches_filters(v, filters))
            .map(|v| SearchHit {
                entry_id: v.entry_id,
                score: cosine(query, &v.embedding),
                feed_id: Some(v.feed_id),
                published_at: Some(v.published_at),
                author: Some(v.author.clone()),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn upsert_user_preference(&self, pref: &PreferenceVector) -> RelevanceResult<()> {
        self.inner
            .lock()
            .await
            .preferences
            .insert(pref.storage_id(), pref.clone());
        Ok(())
    }

    async fn get_user_preferences(&self, user_id: Uuid) -> RelevanceResult<UserPreferences> {
        let mut inner = self.inner.lock().await;
        inner.preference_fetches += 1;
        Ok(UserPreferences {
            positive: inner
                .preferences
                .get(&format!("{}_positive", user_id))
                .cloned(),
            negative: inner
                .preferences
                .get(&format!("{}_negative", user_id))
                .cloned(),
        })
    }

    async fn delete_entry_embedding(&self, entry_id: Uuid) -> RelevanceResult<()> {
        self.inner.lock().await.entries.remove(&entry_id);
        Ok(())
    }

    async fn delete_user_preferences(&self, user_id: Uuid) -> RelevanceResult<()> {
        let mut inner = self.inner.lock().await;
        inner.preferences.remove(&format!("{}_positive", user_id));
        inner.preferences.remove(&format!("{}_negative", user_id));
        Ok(())
    }
}
