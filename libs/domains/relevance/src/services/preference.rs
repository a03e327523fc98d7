use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RelevanceResult;
use crate::lock::{LockManager, preference_lock_key};
use crate::models::{
    Polarity, PreferenceStats, PreferenceStrength, PreferenceVector, SignalType, UserPreferences,
};
use crate::repository::VectorRepository;
use crate::services::score::ScoringParams;
use crate::store::{EntryStore, PreferenceStatsStore};

/// Norms at or below this are treated as zero and left unnormalized.
pub const NORM_EPSILON: f32 = 1e-8;

const LOCK_TTL: Duration = Duration::from_secs(10);
const LOCK_WAIT: Duration = Duration::from_secs(5);

/// Below this sample weight a preference model is considered weak.
const WEAK_SAMPLE_THRESHOLD: f32 = 5.0;

/// Maintains the per-user preference model: two moving-average vectors
/// (positive and negative) plus feed/author affinity counters.
pub struct PreferenceService {
    entries: Arc<dyn EntryStore>,
    stats: Arc<dyn PreferenceStatsStore>,
    repository: Arc<dyn VectorRepository>,
    locks: Arc<dyn LockManager>,
    params: ScoringParams,
}

impl PreferenceService {
    pub fn new(
        entries: Arc<dyn EntryStore>,
        stats: Arc<dyn PreferenceStatsStore>,
        repository: Arc<dyn VectorRepository>,
        locks: Arc<dyn LockManager>,
    ) -> Self {
        Self {
            entries,
            stats,
            repository,
            locks,
            params: ScoringParams::default(),
        }
    }

    pub fn with_params(mut self, params: ScoringParams) -> Self {
        self.params = params;
        self
    }

    /// Fold one feedback signal into the user's preference model.
    ///
    /// An entry without a stored embedding contributes nothing; signals are
    /// append-only, so removing a reaction later does not rewind the average
    /// (a full rebuild does).
    pub async fn handle_signal(
        &self,
        user_id: Uuid,
        entry_id: Uuid,
        signal: SignalType,
    ) -> RelevanceResult<()> {
        let weight = signal.weight();

        let Some(embedding) = self.repository.get_entry_embedding(entry_id).await? else {
            debug!(entry_id = %entry_id, "No embedding for entry, signal ignored");
            return Ok(());
        };
        let Some(entry) = self.entries.get_entry(entry_id).await? else {
            debug!(entry_id = %entry_id, "Entry gone, signal ignored");
            return Ok(());
        };

        self.update_preference_vector(user_id, &embedding, weight)
            .await?;
        self.update_affinity(
            user_id,
            entry.feed_id,
            entry.author.as_deref(),
            weight > 0.0,
            weight.abs(),
        )
        .await?;

        debug!(
            user_id = %user_id,
            entry_id = %entry_id,
            signal = signal.as_str(),
            "Preference signal applied"
        );
        Ok(())
    }

    /// Locked read-modify-write of one polarity's moving average.
    pub async fn update_preference_vector(
        &self,
        user_id: Uuid,
        embedding: &[f32],
        weight: f32,
    ) -> RelevanceResult<()> {
        let polarity = Polarity::from_weight(weight);
        let key = preference_lock_key(user_id, polarity);

        let guard = self.locks.acquire(&key, LOCK_TTL, LOCK_WAIT).await?;
        let result = self
            .update_vector_locked(user_id, embedding, polarity, weight.abs())
            .await;
        if let Err(e) = self.locks.release(guard).await {
            warn!(key = %key, error = %e, "Lock release failed");
        }
        result
    }

    async fn update_vector_locked(
        &self,
        user_id: Uuid,
        embedding: &[f32],
        polarity: Polarity,
        weight: f32,
    ) -> RelevanceResult<()> {
        let prefs = self.repository.get_user_preferences(user_id).await?;
        let existing = match polarity {
            Polarity::Positive => prefs.positive,
            Polarity::Negative => prefs.negative,
        };

        let old = existing
            .as_ref()
            .filter(|p| {
                if p.embedding.len() == embedding.len() {
                    true
                } else {
                    // Stale vector from a previous embedding space, start over
                    warn!(
                        user_id = %user_id,
                        old_dim = p.embedding.len(),
                        new_dim = embedding.len(),
                        "Preference vector dimension mismatch, resetting"
                    );
                    false
                }
            })
            .map(|p| (p.embedding.as_slice(), p.sample_count));

        let (mut values, sample_count) = fold_sample(old, embedding, weight);
        normalize(&mut values);

        self.repository
            .upsert_user_preference(&PreferenceVector {
                user_id,
                polarity,
                embedding: values,
                sample_count,
                updated_at: Utc::now().timestamp(),
            })
            .await
    }

    /// Update overall and per-feed/per-author counters. Runs outside the
    /// vector lock, counter writes are last-writer-wins.
    async fn update_affinity(
        &self,
        user_id: Uuid,
        feed_id: Uuid,
        author: Option<&str>,
        positive: bool,
        weight: f32,
    ) -> RelevanceResult<()> {
        let mut stats = self
            .stats
            .get_stats(user_id)
            .await?
            .unwrap_or_else(|| PreferenceStats::new(user_id));

        if positive {
            stats.positive_count += weight;
        } else {
            stats.negative_count += weight;
        }

        let feed_counts = stats.source_affinity.entry(feed_id).or_default();
        if positive {
            feed_counts.positive += weight;
        } else {
            feed_counts.negative += weight;
        }

        if let Some(author) = author.filter(|a| !a.is_empty()) {
            let author_counts = stats.author_affinity.entry(author.to_string()).or_default();
            if positive {
                author_counts.positive += weight;
            } else {
                author_counts.negative += weight;
            }
        }

        self.stats.put_stats(&stats).await
    }

    /// Rebuild the user's model from scratch by replaying their like and
    /// dislike history in order.
    pub async fn rebuild_from_history(&self, user_id: Uuid) -> RelevanceResult<()> {
        self.repository.delete_user_preferences(user_id).await?;
        self.stats.delete_stats(user_id).await?;

        let history = self.stats.feedback_history(user_id).await?;
        let mut replayed = 0u32;
        for event in &history {
            if matches!(event.signal, SignalType::Like | SignalType::Dislike) {
                self.handle_signal(user_id, event.entry_id, event.signal)
                    .await?;
                replayed += 1;
            }
        }

        info!(user_id = %user_id, replayed, "Preference model rebuilt from history");
        Ok(())
    }

    /// Both preference vectors for a user.
    pub async fn get_preferences(&self, user_id: Uuid) -> RelevanceResult<UserPreferences> {
        self.repository.get_user_preferences(user_id).await
    }

    /// Coarse label for how much feedback backs the model.
    pub async fn preference_strength(&self, user_id: Uuid) -> RelevanceResult<PreferenceStrength> {
        let prefs = self.repository.get_user_preferences(user_id).await?;
        let samples = prefs.total_samples();

        Ok(if samples < WEAK_SAMPLE_THRESHOLD {
            PreferenceStrength::Weak
        } else if (samples as f64) < self.params.confidence_threshold {
            PreferenceStrength::Moderate
        } else {
            PreferenceStrength::Strong
        })
    }
}

/// Weighted moving-average fold of one sample into an existing aggregate.
pub fn fold_sample(
    old: Option<(&[f32], f32)>,
    sample: &[f32],
    weight: f32,
) -> (Vec<f32>, f32) {
    match old {
        None => (sample.to_vec(), weight),
        Some((values, count)) => {
            let total = count + weight;
            let folded = values
                .iter()
                .zip(sample)
                .map(|(v, s)| (v * count + s * weight) / total)
                .collect();
            (folded, total)
        }
    }
}

/// Normalize in place to unit length. Near-zero vectors are left as-is and
/// reported with `false`.
pub fn normalize(values: &mut [f32]) -> bool {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm <= NORM_EPSILON {
        return false;
    }
    for v in values.iter_mut() {
        *v /= norm;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm_of(values: &[f32]) -> f32 {
        values.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    #[test]
    fn test_fold_first_sample() {
        let (values, count) = fold_sample(None, &[1.0, 0.0], 0.7);
        assert_eq!(values, vec![1.0, 0.0]);
        assert_eq!(count, 0.7);
    }

    #[test]
    fn test_fold_moving_average() {
        let old = vec![1.0f32, 0.0];
        let (values, count) = fold_sample(Some((&old, 1.0)), &[0.0, 1.0], 1.0);
        assert_eq!(values, vec![0.5, 0.5]);
        assert_eq!(count, 2.0);

        // A bookmark's 0.7 pulls less than a like
        let (values, count) = fold_sample(Some((&old, 1.0)), &[0.0, 1.0], 0.7);
        assert!((values[0] - 1.0 / 1.7).abs() < 1e-6);
        assert!((values[1] - 0.7 / 1.7).abs() < 1e-6);
        assert!((count - 1.7).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_unit_length() {
        let mut values = vec![3.0f32, 4.0];
        assert!(normalize(&mut values));
        assert!((norm_of(&values) - 1.0).abs() < 1e-6);
        assert!((values[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_skips_near_zero() {
        let mut values = vec![0.0f32, 1e-10];
        assert!(!normalize(&mut values));
        assert_eq!(values, vec![0.0, 1e-10]);
    }

    #[test]
    fn test_fold_then_normalize_stays_unit() {
        let mut aggregate = vec![0.8f32, 0.6];
        let mut count = 3.0;
        for sample in [[0.0f32, 1.0], [1.0, 0.0], [0.6, 0.8]] {
            let (folded, new_count) = fold_sample(Some((&aggregate, count)), &sample, 1.0);
            aggregate = folded;
            count = new_count;
            normalize(&mut aggregate);
            assert!((norm_of(&aggregate) - 1.0).abs() < 1e-5);
        }
        assert_eq!(count, 6.0);
    }
}
