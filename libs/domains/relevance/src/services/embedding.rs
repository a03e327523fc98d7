use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::embedding::EmbeddingClient;
use crate::error::RelevanceResult;
use crate::models::{EmbeddingStatus, Entry, EntryVector};
use crate::repository::VectorRepository;
use crate::store::EntryStore;

/// Embeddings are capped at this many characters of prepared text.
pub const MAX_EMBED_CHARS: usize = 30_000;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").unwrap());

/// Outcome of a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub processed: u32,
    pub failed: u32,
}

/// Turns entries into vectors: text preparation, embedding generation,
/// vector storage and entry status bookkeeping.
pub struct EmbeddingService {
    entries: Arc<dyn EntryStore>,
    repository: Arc<dyn VectorRepository>,
    client: EmbeddingClient,
}

impl EmbeddingService {
    pub fn new(
        entries: Arc<dyn EntryStore>,
        repository: Arc<dyn VectorRepository>,
        client: EmbeddingClient,
    ) -> Self {
        Self {
            entries,
            repository,
            client,
        }
    }

    /// Generate and store the embedding for one entry.
    ///
    /// Returns `Ok(true)` when the entry ends up embedded (including the
    /// already-`done` case) and `Ok(false)` when the entry is missing or
    /// failed. Per-entry failures are recorded on the entry rather than
    /// propagated, so one bad entry cannot wedge a batch.
    pub async fn generate_for_entry(&self, entry_id: Uuid) -> RelevanceResult<bool> {
        let Some(entry) = self.entries.get_entry(entry_id).await? else {
            warn!(entry_id = %entry_id, "Entry not found, skipping embedding");
            return Ok(false);
        };

        if entry.embedding_status == EmbeddingStatus::Done {
            debug!(entry_id = %entry_id, "Entry already embedded, skipping");
            return Ok(true);
        }

        self.entries.mark_processing(entry_id).await?;

        let text = extract_text(&entry);
        if text.is_empty() {
            self.entries
                .mark_failed(entry_id, "no text content to embed")
                .await?;
            return Ok(false);
        }

        match self.embed_and_store(&entry, &text).await {
            Ok(()) => {
                debug!(entry_id = %entry_id, "Entry embedded");
                Ok(true)
            }
            Err(e) => {
                error!(entry_id = %entry_id, error = %e, "Embedding failed");
                self.entries.mark_failed(entry_id, &e.to_string()).await?;
                Ok(false)
            }
        }
    }

    async fn embed_and_store(&self, entry: &Entry, text: &str) -> RelevanceResult<()> {
        let output = self.client.generate_embedding(text).await?;
        let words = word_count(text);

        let vector = EntryVector {
            entry_id: entry.id,
            embedding: output.values,
            feed_id: entry.feed_id,
            published_at: entry
                .published_at
                .map(|t| t.timestamp())
                .unwrap_or_else(|| Utc::now().timestamp()),
            language: detect_language(text).to_string(),
            word_count: words,
            author: entry.author.clone().unwrap_or_default(),
        };

        self.repository.insert_entry_embedding(&vector).await?;
        self.entries.mark_done(entry.id, words).await?;
        Ok(())
    }

    /// Embed up to `limit` pending entries, newest first.
    pub async fn batch_generate(&self, limit: usize) -> RelevanceResult<BatchStats> {
        let pending = self.entries.list_pending(limit).await?;
        let stats = self.run_batch(pending).await?;
        info!(
            processed = stats.processed,
            failed = stats.failed,
            "Batch embedding run finished"
        );
        Ok(stats)
    }

    /// Re-attempt up to `limit` failed entries, stalest first.
    pub async fn retry_failed(&self, limit: usize) -> RelevanceResult<BatchStats> {
        let failed = self.entries.list_failed(limit).await?;
        for entry in &failed {
            self.entries.reset_to_pending(entry.id).await?;
        }
        let stats = self.run_batch(failed).await?;
        info!(
            processed = stats.processed,
            failed = stats.failed,
            "Retry run finished"
        );
        Ok(stats)
    }

    async fn run_batch(&self, entries: Vec<Entry>) -> RelevanceResult<BatchStats> {
        let mut stats = BatchStats::default();
        for entry in entries {
            if self.generate_for_entry(entry.id).await? {
                stats.processed += 1;
            } else {
                stats.failed += 1;
            }
        }
        Ok(stats)
    }

    /// Remove an entry's vector and reset it to `pending`.
    pub async fn delete_embedding(&self, entry_id: Uuid) -> RelevanceResult<()> {
        self.repository.delete_entry_embedding(entry_id).await?;
        self.entries.reset_to_pending(entry_id).await?;
        Ok(())
    }
}

/// Title plus content (falling back to summary), tags stripped, whitespace
/// collapsed, truncated to [`MAX_EMBED_CHARS`].
pub fn extract_text(entry: &Entry) -> String {
    let body = entry
        .content
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or(entry.summary.as_deref())
        .unwrap_or("");

    let combined = format!("{}\n\n{}", entry.title, body);
    let without_tags = TAG_RE.replace_all(&combined, " ");
    let collapsed = WS_RE.replace_all(&without_tags, " ");
    let trimmed = collapsed.trim();

    if trimmed.chars().count() > MAX_EMBED_CHARS {
        trimmed.chars().take(MAX_EMBED_CHARS).collect()
    } else {
        trimmed.to_string()
    }
}

pub fn word_count(text: &str) -> u32 {
    WORD_RE.find_iter(text).count() as u32
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}' | '\u{3040}'..='\u{309F}' | '\u{30A0}'..='\u{30FF}')
}

fn is_hiragana(c: char) -> bool {
    matches!(c, '\u{3040}'..='\u{309F}')
}

/// Coarse language tag for the stored vector row. More than 10 CJK
/// characters means Japanese when hiragana is present, Chinese otherwise.
pub fn detect_language(text: &str) -> &'static str {
    let cjk_count = text.chars().filter(|c| is_cjk(*c)).count();
    if cjk_count > 10 {
        if text.chars().any(is_hiragana) {
            "ja"
        } else {
            "zh"
        }
    } else {
        "en"
    }
}
