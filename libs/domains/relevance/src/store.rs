use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RelevanceResult;
use crate::models::{EmbeddingCounts, Entry, FeedbackEvent, PreferenceStats};

/// Relational-store seam for entries.
///
/// The owning application keeps entries in its own database; this domain only
/// needs lookups, embedding-status transitions and a few listings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn get_entry(&self, entry_id: Uuid) -> RelevanceResult<Option<Entry>>;

    async fn mark_processing(&self, entry_id: Uuid) -> RelevanceResult<()>;

    /// Mark `done`, record the computed word count and the embedding time.
    async fn mark_done(&self, entry_id: Uuid, word_count: u32) -> RelevanceResult<()>;

    /// Mark `failed` with the error message.
    async fn mark_failed(&self, entry_id: Uuid, error: &str) -> RelevanceResult<()>;

    /// Reset one entry to `pending`, clearing any stored error.
    async fn reset_to_pending(&self, entry_id: Uuid) -> RelevanceResult<()>;

    /// Reset every entry to `pending` (rebuild preparation).
    async fn reset_all_to_pending(&self) -> RelevanceResult<()>;

    /// Up to `limit` `pending` entries, newest first.
    async fn list_pending(&self, limit: usize) -> RelevanceResult<Vec<Entry>>;

    /// Up to `limit` `failed` entries, stalest first.
    async fn list_failed(&self, limit: usize) -> RelevanceResult<Vec<Entry>>;

    /// Ids of all entries, for rebuild fan-out.
    async fn list_entry_ids(&self) -> RelevanceResult<Vec<Uuid>>;

    /// Embedding status counts across all entries.
    async fn embedding_counts(&self) -> RelevanceResult<EmbeddingCounts>;
}

/// Relational-store seam for per-user preference statistics and feedback
/// history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreferenceStatsStore: Send + Sync {
    async fn get_stats(&self, user_id: Uuid) -> RelevanceResult<Option<PreferenceStats>>;

    async fn put_stats(&self, stats: &PreferenceStats) -> RelevanceResult<()>;

    async fn delete_stats(&self, user_id: Uuid) -> RelevanceResult<()>;

    /// Users that have any recorded preference data, for rebuild fan-out.
    async fn users_with_stats(&self) -> RelevanceResult<Vec<Uuid>>;

    /// A user's feedback events in chronological order.
    async fn feedback_history(&self, user_id: Uuid) -> RelevanceResult<Vec<FeedbackEvent>>;
}
