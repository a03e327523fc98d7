use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an entry's embedding row in the relational store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl EmbeddingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingStatus::Pending => "pending",
            EmbeddingStatus::Processing => "processing",
            EmbeddingStatus::Done => "done",
            EmbeddingStatus::Failed => "failed",
        }
    }
}

/// A feed entry as seen by this domain. Only the fields the vectorization
/// pipeline reads are modeled; the owning store keeps the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: Uuid,
    pub feed_id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub embedding_status: EmbeddingStatus,
    pub embedding_error: Option<String>,
    pub embedding_at: Option<DateTime<Utc>>,
    pub word_count: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Explicit user feedback on an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Like,
    Dislike,
    Bookmark,
}

impl SignalType {
    /// Signed weight folded into the preference model. The sign selects the
    /// polarity, the magnitude is the sample weight.
    pub fn weight(&self) -> f32 {
        match self {
            SignalType::Like => 1.0,
            SignalType::Dislike => -1.0,
            SignalType::Bookmark => 0.7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Like => "like",
            SignalType::Dislike => "dislike",
            SignalType::Bookmark => "bookmark",
        }
    }
}

/// Which of the two per-user preference vectors a value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Positive => "positive",
            Polarity::Negative => "negative",
        }
    }

    pub fn from_weight(weight: f32) -> Self {
        if weight > 0.0 {
            Polarity::Positive
        } else {
            Polarity::Negative
        }
    }
}

/// Row stored in the entries collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryVector {
    pub entry_id: Uuid,
    pub embedding: Vec<f32>,
    pub feed_id: Uuid,
    pub published_at: i64,
    pub language: String,
    pub word_count: u32,
    pub author: String,
}

/// Row stored in the user preferences collection, keyed `{user_id}_{polarity}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceVector {
    pub user_id: Uuid,
    pub polarity: Polarity,
    pub embedding: Vec<f32>,
    /// Accumulated sample weight, not a row count: a bookmark adds 0.7.
    pub sample_count: f32,
    pub updated_at: i64,
}

impl PreferenceVector {
    pub fn storage_id(&self) -> String {
        format!("{}_{}", self.user_id, self.polarity.as_str())
    }
}

/// Both preference vectors for one user
#[derive(Debug, Clone, Default)]
pub struct UserPreferences {
    pub positive: Option<PreferenceVector>,
    pub negative: Option<PreferenceVector>,
}

impl UserPreferences {
    pub fn is_empty(&self) -> bool {
        self.positive.is_none() && self.negative.is_none()
    }

    pub fn total_samples(&self) -> f32 {
        self.positive.as_ref().map_or(0.0, |p| p.sample_count)
            + self.negative.as_ref().map_or(0.0, |n| n.sample_count)
    }
}

/// Positive/negative interaction tallies for one feed or author
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AffinityCounts {
    pub positive: f32,
    pub negative: f32,
}

impl AffinityCounts {
    pub fn total(&self) -> f32 {
        self.positive + self.negative
    }
}

/// Per-user interaction counters kept in the relational store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceStats {
    pub user_id: Uuid,
    pub positive_count: f32,
    pub negative_count: f32,
    #[serde(default)]
    pub source_affinity: HashMap<Uuid, AffinityCounts>,
    #[serde(default)]
    pub author_affinity: HashMap<String, AffinityCounts>,
}

impl PreferenceStats {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            positive_count: 0.0,
            negative_count: 0.0,
            source_affinity: HashMap::new(),
            author_affinity: HashMap::new(),
        }
    }
}

/// One historical feedback event, used to replay a user's preference model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub entry_id: Uuid,
    pub signal: SignalType,
    pub created_at: DateTime<Utc>,
}

/// Embedding status counts across all entries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingCounts {
    pub total: u64,
    pub pending: u64,
    pub processing: u64,
    pub done: u64,
    pub failed: u64,
}

impl EmbeddingCounts {
    /// A rebuild is complete once every entry reached a terminal status.
    /// An empty corpus never completes a rebuild on its own.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.done + self.failed >= self.total
    }
}

/// Optional constraints for similarity search over entries
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub feed_id: Option<Uuid>,
    pub min_published_at: Option<DateTime<Utc>>,
}

/// One similarity search hit
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub entry_id: Uuid,
    pub score: f32,
    pub feed_id: Option<Uuid>,
    pub published_at: Option<i64>,
    pub author: Option<String>,
}

/// Identity of the embedding space a collection was built for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub provider: String,
    pub model: String,
    pub dimension: usize,
}

impl CollectionSpec {
    /// Compatibility signature embedded in the collection description.
    /// Any component change means stored vectors are unusable.
    pub fn signature(&self) -> String {
        format!("{}:{}:{}", self.provider, self.model, self.dimension)
    }
}

/// Why a score fell back to the neutral default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreReason {
    EntryNotFound,
    NoEmbedding,
    NoPreferenceModel,
}

/// A relevance score with its contributing factors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub score: f64,
    pub positive_sim: f64,
    pub negative_sim: f64,
    pub confidence: f64,
    pub source_boost: f64,
    pub author_boost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ScoreReason>,
}

impl ScoreBreakdown {
    pub fn neutral(default_score: f64, reason: ScoreReason) -> Self {
        Self {
            score: default_score,
            positive_sim: 0.0,
            negative_sim: 0.0,
            confidence: 0.0,
            source_boost: 0.0,
            author_boost: 0.0,
            reason: Some(reason),
        }
    }
}

/// How much signal a user's preference model carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceStrength {
    Weak,
    Moderate,
    Strong,
}
