use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::RelevanceResult;
use crate::models::{
    AffinityCounts, Entry, PreferenceStats, ScoreBreakdown, ScoreReason, UserPreferences,
};
use crate::repository::VectorRepository;
use crate::store::{EntryStore, PreferenceStatsStore};

/// Scoring knobs, all defaulted to the shipped tuning
#[derive(Debug, Clone)]
pub struct ScoringParams {
    /// Neutral score used when nothing is known.
    pub default_score: f64,
    /// Sample weight at which the model is trusted fully.
    pub confidence_threshold: f64,
    pub source_boost_max: f64,
    pub author_boost_max: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            default_score: 50.0,
            confidence_threshold: 10.0,
            source_boost_max: 5.0,
            author_boost_max: 3.0,
        }
    }
}

/// Computes 0-100 relevance scores for (user, entry) pairs.
pub struct ScoreService {
    entries: Arc<dyn EntryStore>,
    stats: Arc<dyn PreferenceStatsStore>,
    repository: Arc<dyn VectorRepository>,
    params: ScoringParams,
}

impl ScoreService {
    pub fn new(
        entries: Arc<dyn EntryStore>,
        stats: Arc<dyn PreferenceStatsStore>,
        repository: Arc<dyn VectorRepository>,
    ) -> Self {
        Self {
            entries,
            stats,
            repository,
            params: ScoringParams::default(),
        }
    }

    pub fn with_params(mut self, params: ScoringParams) -> Self {
        self.params = params;
        self
    }

    /// Score one entry for one user, with the factor breakdown.
    pub async fn score_entry(
        &self,
        user_id: Uuid,
        entry_id: Uuid,
    ) -> RelevanceResult<ScoreBreakdown> {
        let Some(entry) = self.entries.get_entry(entry_id).await? else {
            return Ok(ScoreBreakdown::neutral(
                self.params.default_score,
                ScoreReason::EntryNotFound,
            ));
        };

        let Some(embedding) = self.repository.get_entry_embedding(entry_id).await? else {
            return Ok(ScoreBreakdown::neutral(
                self.params.default_score,
                ScoreReason::NoEmbedding,
            ));
        };

        let prefs = self.repository.get_user_preferences(user_id).await?;
        if prefs.is_empty() {
            return Ok(ScoreBreakdown::neutral(
                self.params.default_score,
                ScoreReason::NoPreferenceModel,
            ));
        }

        let stats = self.stats.get_stats(user_id).await?;
        Ok(self.compose(&embedding, &prefs, stats.as_ref(), &entry))
    }

    /// Score many entries with one preference fetch, one stats fetch and one
    /// batched vector fetch.
    pub async fn batch_score(
        &self,
        user_id: Uuid,
        entries: &[Entry],
    ) -> RelevanceResult<HashMap<Uuid, f64>> {
        let mut scores = HashMap::with_capacity(entries.len());
        if entries.is_empty() {
            return Ok(scores);
        }

        let prefs = self.repository.get_user_preferences(user_id).await?;
        if prefs.is_empty() {
            for entry in entries {
                scores.insert(entry.id, self.params.default_score);
            }
            return Ok(scores);
        }

        let stats = self.stats.get_stats(user_id).await?;
        let ids: Vec<Uuid> = entries.iter().map(|e| e.id).collect();
        let embeddings = self.repository.batch_get_entry_embeddings(&ids).await?;

        for entry in entries {
            let score = match embeddings.get(&entry.id) {
                Some(embedding) => {
                    self.compose(embedding, &prefs, stats.as_ref(), entry).score
                }
                None => self.params.default_score,
            };
            scores.insert(entry.id, score);
        }

        debug!(
            user_id = %user_id,
            entries = entries.len(),
            embedded = embeddings.len(),
            "Batch scored"
        );
        Ok(scores)
    }

    fn compose(
        &self,
        embedding: &[f32],
        prefs: &UserPreferences,
        stats: Option<&PreferenceStats>,
        entry: &Entry,
    ) -> ScoreBreakdown {
        let positive_sim = prefs
            .positive
            .as_ref()
            .map(|p| cosine_similarity(embedding, &p.embedding))
            .unwrap_or(0.0);
        let negative_sim = prefs
            .negative
            .as_ref()
            .map(|n| cosine_similarity(embedding, &n.embedding))
            .unwrap_or(0.0);

        // raw in [-2, 2] collapses to [-1, 1] in practice since both sims are
        // cosines against unit vectors; midpoint-shift to 0..100.
        let raw = positive_sim - negative_sim;
        let base = (raw + 1.0) / 2.0 * 100.0;

        let confidence =
            (f64::from(prefs.total_samples()) / self.params.confidence_threshold).min(1.0);
        let mut score = base * confidence + self.params.default_score * (1.0 - confidence);

        let source_boost = stats
            .and_then(|s| s.source_affinity.get(&entry.feed_id))
            .map(|c| affinity_boost(c, self.params.source_boost_max))
            .unwrap_or(0.0);
        let author_boost = entry
            .author
            .as_deref()
            .filter(|a| !a.is_empty())
            .and_then(|a| stats.and_then(|s| s.author_affinity.get(a)))
            .map(|c| affinity_boost(c, self.params.author_boost_max))
            .unwrap_or(0.0);

        score = (score + source_boost + author_boost).clamp(0.0, 100.0);

        ScoreBreakdown {
            score: round_to(score, 1),
            positive_sim: round_to(positive_sim, 3),
            negative_sim: round_to(negative_sim, 3),
            confidence: round_to(confidence, 2),
            source_boost: round_to(source_boost, 2),
            author_boost: round_to(author_boost, 2),
            reason: None,
        }
    }
}

/// Signed share of positive interactions, scaled to `max_boost`.
/// All-positive history yields +max, all-negative -max.
fn affinity_boost(counts: &AffinityCounts, max_boost: f64) -> f64 {
    let total = f64::from(counts.total());
    if total <= 0.0 {
        return 0.0;
    }
    (f64::from(counts.positive) - f64::from(counts.negative)) / total * max_boost
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Polarity, PreferenceVector};
    use crate::repository::MockVectorRepository;
    use crate::store::{MockEntryStore, MockPreferenceStatsStore};
    use chrono::{TimeZone, Utc};

    fn pref(polarity: Polarity, embedding: Vec<f32>, samples: f32) -> PreferenceVector {
        PreferenceVector {
            user_id: Uuid::nil(),
            polarity,
            embedding,
            sample_count: samples,
            updated_at: 0,
        }
    }

    fn entry() -> Entry {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        Entry {
            id: Uuid::new_v4(),
            feed_id: Uuid::new_v4(),
            title: "t".to_string(),
            content: None,
            summary: None,
            author: Some("author".to_string()),
            published_at: Some(now),
            embedding_status: crate::models::EmbeddingStatus::Done,
            embedding_error: None,
            embedding_at: Some(now),
            word_count: Some(1),
            created_at: now,
            updated_at: now,
        }
    }

    fn service() -> ScoreService {
        ScoreService::new(
            Arc::new(MockEntryStore::new()),
            Arc::new(MockPreferenceStatsStore::new()),
            Arc::new(MockVectorRepository::new()),
        )
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-9);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_affinity_boost() {
        let all_positive = AffinityCounts {
            positive: 4.0,
            negative: 0.0,
        };
        assert_eq!(affinity_boost(&all_positive, 5.0), 5.0);

        let all_negative = AffinityCounts {
            positive: 0.0,
            negative: 2.0,
        };
        assert_eq!(affinity_boost(&all_negative, 5.0), -5.0);

        let mixed = AffinityCounts {
            positive: 3.0,
            negative: 1.0,
        };
        assert_eq!(affinity_boost(&mixed, 5.0), 2.5);

        assert_eq!(affinity_boost(&AffinityCounts::default(), 5.0), 0.0);
    }

    #[test]
    fn test_zero_confidence_yields_default() {
        let prefs = UserPreferences {
            positive: Some(pref(Polarity::Positive, vec![1.0, 0.0], 0.0)),
            negative: None,
        };
        let breakdown = service().compose(&[1.0, 0.0], &prefs, None, &entry());
        assert_eq!(breakdown.score, 50.0);
        assert_eq!(breakdown.confidence, 0.0);
    }

    #[test]
    fn test_full_confidence_uses_similarity_only() {
        let prefs = UserPreferences {
            positive: Some(pref(Polarity::Positive, vec![1.0, 0.0], 10.0)),
            negative: None,
        };
        // Perfectly aligned: raw=1 -> base=100
        let breakdown = service().compose(&[1.0, 0.0], &prefs, None, &entry());
        assert_eq!(breakdown.score, 100.0);
        assert_eq!(breakdown.confidence, 1.0);
    }

    #[test]
    fn test_score_monotonic_in_positive_similarity() {
        let prefs = UserPreferences {
            positive: Some(pref(Polarity::Positive, vec![1.0, 0.0], 10.0)),
            negative: Some(pref(Polarity::Negative, vec![0.0, 1.0], 10.0)),
        };
        let svc = service();
        let aligned = svc.compose(&[1.0, 0.0], &prefs, None, &entry()).score;
        let diagonal = svc
            .compose(&[0.707, 0.707], &prefs, None, &entry())
            .score;
        let opposed = svc.compose(&[0.0, 1.0], &prefs, None, &entry()).score;
        assert!(aligned > diagonal);
        assert!(diagonal > opposed);
    }

    #[test]
    fn test_boosts_applied_and_clamped() {
        let prefs = UserPreferences {
            positive: Some(pref(Polarity::Positive, vec![1.0, 0.0], 10.0)),
            negative: None,
        };
        let entry = entry();
        let mut stats = PreferenceStats::new(Uuid::nil());
        stats.source_affinity.insert(
            entry.feed_id,
            AffinityCounts {
                positive: 5.0,
                negative: 0.0,
            },
        );
        stats.author_affinity.insert(
            "author".to_string(),
            AffinityCounts {
                positive: 3.0,
                negative: 0.0,
            },
        );

        // Base is already 100; boosts must not push past the clamp
        let breakdown = service().compose(&[1.0, 0.0], &prefs, Some(&stats), &entry);
        assert_eq!(breakdown.score, 100.0);
        assert_eq!(breakdown.source_boost, 5.0);
        assert_eq!(breakdown.author_boost, 3.0);
    }
}
