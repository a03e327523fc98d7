use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use domain_relevance::error::RelevanceResult;
use domain_relevance::models::{
    EmbeddingCounts, EmbeddingStatus, Entry, FeedbackEvent, PreferenceStats, SignalType,
};
use domain_relevance::store::{EntryStore, PreferenceStatsStore};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Entry store over a hash map, with the ordering guarantees of the real
/// queries (pending newest first, failed stalest first).
#[derive(Default)]
pub struct InMemoryEntryStore {
    entries: Mutex<HashMap<Uuid, Entry>>,
}

impl InMemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, entry: Entry) {
        self.entries.lock().await.insert(entry.id, entry);
    }

    pub async fn get(&self, entry_id: Uuid) -> Option<Entry> {
        self.entries.lock().await.get(&entry_id).cloned()
    }

    pub async fn status_of(&self, entry_id: Uuid) -> Option<EmbeddingStatus> {
        self.entries
            .lock()
            .await
            .get(&entry_id)
            .map(|e| e.embedding_status)
    }

    async fn update<F: FnOnce(&mut Entry)>(&self, entry_id: Uuid, f: F) -> RelevanceResult<()> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(&entry_id) {
            f(entry);
            entry.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl EntryStore for InMemoryEntryStore {
    async fn get_entry(&self, entry_id: Uuid) -> RelevanceResult<Option<Entry>> {
        Ok(self.entries.lock().await.get(&entry_id).cloned())
    }

    async fn mark_processing(&self, entry_id: Uuid) -> RelevanceResult<()> {
        self.update(entry_id, |e| {
            e.embedding_status = EmbeddingStatus::Processing;
        })
        .await
    }

    async fn mark_done(&self, entry_id: Uuid, word_count: u32) -> RelevanceResult<()> {
        self.update(entry_id, |e| {
            e.embedding_status = EmbeddingStatus::Done;
            e.embedding_error = None;
            e.embedding_at = Some(Utc::now());
            e.word_count = Some(word_count);
        })
        .await
    }

    async fn mark_failed(&self, entry_id: Uuid, error: &str) -> RelevanceResult<()> {
        let error = error.to_string();
        self.update(entry_id, move |e| {
            e.embedding_status = EmbeddingStatus::Failed;
            e.embedding_error = Some(error);
        })
        .await
    }

    async fn reset_to_pending(&self, entry_id: Uuid) -> RelevanceResult<()> {
        self.update(entry_id, |e| {
            e.embedding_status = EmbeddingStatus::Pending;
            e.embedding_error = None;
        })
        .await
    }

    async fn reset_all_to_pending(&self) -> RelevanceResult<()> {
        let mut entries = self.entries.lock().await;
        for entry in entries.values_mut() {
            entry.embedding_status = EmbeddingStatus::Pending;
            entry.embedding_error = None;
        }
        Ok(())
    }

    async fn list_pending(&self, limit: usize) -> RelevanceResult<Vec<Entry>> {
        let entries = self.entries.lock().await;
        let mut pending: Vec<Entry> = entries
            .values()
            .filter(|e| e.embedding_status == EmbeddingStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|e| std::cmp::Reverse(e.published_at.unwrap_or(e.created_at)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn list_failed(&self, limit: usize) -> RelevanceResult<Vec<Entry>> {
        let entries = self.entries.lock().await;
        let mut failed: Vec<Entry> = entries
            .values()
            .filter(|e| e.embedding_status == EmbeddingStatus::Failed)
            .cloned()
            .collect();
        failed.sort_by_key(|e| e.updated_at);
        failed.truncate(limit);
        Ok(failed)
    }

    async fn list_entry_ids(&self) -> RelevanceResult<Vec<Uuid>> {
        let entries = self.entries.lock().await;
        let mut ids: Vec<Uuid> = entries.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn embedding_counts(&self) -> RelevanceResult<EmbeddingCounts> {
        let entries = self.entries.lock().await;
        let mut counts = EmbeddingCounts::default();
        for entry in entries.values() {
            counts.total += 1;
            match entry.embedding_status {
                EmbeddingStatus::Pending => counts.pending += 1,
                EmbeddingStatus::Processing => counts.processing += 1,
                EmbeddingStatus::Done => counts.done += 1,
                EmbeddingStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }
}

/// Stats store plus an append-only feedback log per user.
#[derive(Default)]
pub struct InMemoryStatsStore {
    stats: Mutex<HashMap<Uuid, PreferenceStats>>,
    history: Mutex<HashMap<Uuid, Vec<FeedbackEvent>>>,
}

impl InMemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a feedback event to a user's history (does not touch stats;
    /// that is the preference service's job).
    pub async fn push_feedback(&self, user_id: Uuid, entry_id: Uuid, signal: SignalType) {
        self.history
            .lock()
            .await
            .entry(user_id)
            .or_default()
            .push(FeedbackEvent {
                entry_id,
                signal,
                created_at: Utc::now(),
            });
    }

    pub async fn stats_of(&self, user_id: Uuid) -> Option<PreferenceStats> {
        self.stats.lock().await.get(&user_id).cloned()
    }
}

#[async_trait]
impl PreferenceStatsStore for InMemoryStatsStore {
    async fn get_stats(&self, user_id: Uuid) -> RelevanceResult<Option<PreferenceStats>> {
        Ok(self.stats.lock().await.get(&user_id).cloned())
    }

    async fn put_stats(&self, stats: &PreferenceStats) -> RelevanceResult<()> {
        self.stats.lock().await.insert(stats.user_id, stats.clone());
        Ok(())
    }

    async fn delete_stats(&self, user_id: Uuid) -> RelevanceResult<()> {
        self.stats.lock().await.remove(&user_id);
        Ok(())
    }

    async fn users_with_stats(&self) -> RelevanceResult<Vec<Uuid>> {
        let stats = self.stats.lock().await;
        let mut users: Vec<Uuid> = stats.keys().copied().collect();
        users.sort();
        Ok(users)
    }

    async fn feedback_history(&self, user_id: Uuid) -> RelevanceResult<Vec<FeedbackEvent>> {
        Ok(self
            .history
            .lock()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}
