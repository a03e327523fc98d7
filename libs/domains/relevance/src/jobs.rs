use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ConfigStore, VectorizationConfig, VectorizationStatus};
use crate::embedding::{EmbeddingClient, ProviderRegistry};
use crate::error::RelevanceResult;
use crate::lifecycle::VectorizationLifecycle;
use crate::lock::LockManager;
use crate::models::SignalType;
use crate::repository::VectorRepository;
use crate::services::{EmbeddingService, PreferenceService, ValidationService};
use crate::store::{EntryStore, PreferenceStatsStore};

/// Wire contract for queued work. The queue transport lives outside this
/// crate; payloads are tagged JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum Job {
    GenerateEntryEmbedding {
        entry_id: Uuid,
    },
    BatchGenerateEmbeddings {
        limit: usize,
    },
    RetryFailedEmbeddings {
        limit: usize,
    },
    ValidateAndRebuild,
    RebuildEmbeddings {
        /// Explicit config to rebuild for; the stored config when absent.
        config: Option<VectorizationConfig>,
    },
    UpdateUserPreference {
        user_id: Uuid,
        entry_id: Uuid,
        signal: SignalType,
    },
    RebuildUserPreference {
        user_id: Uuid,
    },
}

/// How a handled job ended
#[derive(Debug)]
pub enum JobOutcome {
    /// Done; payload summarizes the result.
    Completed(Value),
    /// Not applicable right now and retrying would not help.
    Skipped(String),
    /// Temporarily blocked, redeliver after the given delay.
    Deferred(Duration),
}

/// Fire-and-forget enqueue seam implemented by the hosting application.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> RelevanceResult<()>;
}

/// Everything a job handler needs, bundled once at worker startup.
pub struct JobContext {
    pub repository: Arc<dyn VectorRepository>,
    pub entries: Arc<dyn EntryStore>,
    pub stats: Arc<dyn PreferenceStatsStore>,
    pub config: Arc<dyn ConfigStore>,
    pub locks: Arc<dyn LockManager>,
    pub queue: Arc<dyn JobQueue>,
    pub registry: Arc<ProviderRegistry>,
}

const VALIDATING_RETRY: Duration = Duration::from_secs(30);
const ERROR_RETRY: Duration = Duration::from_secs(120);

impl JobContext {
    pub fn lifecycle(&self) -> VectorizationLifecycle {
        VectorizationLifecycle::new(
            self.config.clone(),
            self.entries.clone(),
            self.queue.clone(),
        )
    }

    fn embedding_service(&self, config: &VectorizationConfig) -> RelevanceResult<EmbeddingService> {
        let client = EmbeddingClient::from_config(&self.registry, config)?;
        Ok(EmbeddingService::new(
            self.entries.clone(),
            self.repository.clone(),
            client,
        ))
    }

    fn preference_service(&self) -> PreferenceService {
        PreferenceService::new(
            self.entries.clone(),
            self.stats.clone(),
            self.repository.clone(),
            self.locks.clone(),
        )
    }
}

/// Dispatch one job to its handler.
pub async fn run_job(ctx: &JobContext, job: Job) -> RelevanceResult<JobOutcome> {
    debug!(?job, "Running job");
    match job {
        Job::GenerateEntryEmbedding { entry_id } => generate_entry_embedding(ctx, entry_id).await,
        Job::BatchGenerateEmbeddings { limit } => batch_generate_embeddings(ctx, limit).await,
        Job::RetryFailedEmbeddings { limit } => retry_failed_embeddings(ctx, limit).await,
        Job::ValidateAndRebuild => validate_and_rebuild(ctx).await,
        Job::RebuildEmbeddings { config } => rebuild_embeddings(ctx, config).await,
        Job::UpdateUserPreference {
            user_id,
            entry_id,
            signal,
        } => update_user_preference(ctx, user_id, entry_id, signal).await,
        Job::RebuildUserPreference { user_id } => rebuild_user_preference(ctx, user_id).await,
    }
}

/// Breaker wrapper shared by the work-performing handlers: any error escaping
/// the inner future counts as a consecutive failure, a clean finish resets
/// the counter, and the error still propagates so the queue redelivers.
async fn with_breaker<F>(ctx: &JobContext, inner: F) -> RelevanceResult<JobOutcome>
where
    F: Future<Output = RelevanceResult<JobOutcome>>,
{
    let lifecycle = ctx.lifecycle();
    match inner.await {
        Ok(outcome) => {
            lifecycle.record_success().await?;
            Ok(outcome)
        }
        Err(e) => {
            lifecycle.record_failure(&e.to_string()).await?;
            Err(e)
        }
    }
}

async fn generate_entry_embedding(ctx: &JobContext, entry_id: Uuid) -> RelevanceResult<JobOutcome> {
    let config = ctx.config.load().await?;
    if !config.is_operational() {
        return Ok(JobOutcome::Skipped(
            "vectorization not operational".to_string(),
        ));
    }

    with_breaker(ctx, async {
        ctx.repository
            .ensure_collections(&config.collection_spec())
            .await?;
        let service = ctx.embedding_service(&config)?;
        let success = service.generate_for_entry(entry_id).await?;
        Ok(JobOutcome::Completed(json!({
            "entry_id": entry_id,
            "success": success,
        })))
    })
    .await
}

async fn batch_generate_embeddings(ctx: &JobContext, limit: usize) -> RelevanceResult<JobOutcome> {
    let config = ctx.config.load().await?;
    if !config.is_operational() {
        return Ok(JobOutcome::Skipped(
            "vectorization not operational".to_string(),
        ));
    }

    with_breaker(ctx, async {
        ctx.repository
            .ensure_collections(&config.collection_spec())
            .await?;
        let service = ctx.embedding_service(&config)?;
        let stats = service.batch_generate(limit).await?;
        Ok(JobOutcome::Completed(json!({
            "processed": stats.processed,
            "failed": stats.failed,
        })))
    })
    .await
}

async fn retry_failed_embeddings(ctx: &JobContext, limit: usize) -> RelevanceResult<JobOutcome> {
    let config = ctx.config.load().await?;
    if !config.is_operational() {
        return Ok(JobOutcome::Skipped(
            "vectorization not operational".to_string(),
        ));
    }

    with_breaker(ctx, async {
        ctx.repository
            .ensure_collections(&config.collection_spec())
            .await?;
        let service = ctx.embedding_service(&config)?;
        let stats = service.retry_failed(limit).await?;
        Ok(JobOutcome::Completed(json!({
            "processed": stats.processed,
            "failed": stats.failed,
        })))
    })
    .await
}

/// Prove the stored config works end to end, then hand off to the rebuild.
/// Validation failures park the subsystem in `error` rather than retrying:
/// a bad API key does not fix itself.
async fn validate_and_rebuild(ctx: &JobContext) -> RelevanceResult<JobOutcome> {
    let config = ctx.config.load().await?;
    if !config.enabled {
        return Ok(JobOutcome::Skipped("vectorization disabled".to_string()));
    }

    let lifecycle = ctx.lifecycle();
    let validation = ValidationService::new(ctx.registry.clone());

    let provider_outcome = validation.validate_provider(&config).await;
    if !provider_outcome.success {
        lifecycle.fail_validation(&provider_outcome.message).await?;
        return Ok(JobOutcome::Completed(json!({
            "success": false,
            "error": provider_outcome.message,
        })));
    }

    let store_outcome = validation.validate_store(ctx.repository.as_ref()).await;
    if !store_outcome.success {
        lifecycle.fail_validation(&store_outcome.message).await?;
        return Ok(JobOutcome::Completed(json!({
            "success": false,
            "error": store_outcome.message,
        })));
    }

    ctx.queue.enqueue(Job::RebuildEmbeddings { config: None }).await?;
    info!("Validation passed, rebuild queued");
    Ok(JobOutcome::Completed(json!({ "success": true })))
}

/// Recreate the collections for the (possibly new) embedding space and fan
/// out one embedding job per entry plus one preference rebuild per user.
/// Status stays `rebuilding`; status reads flip it to `idle` when the counts
/// show every entry terminal.
async fn rebuild_embeddings(
    ctx: &JobContext,
    config_override: Option<VectorizationConfig>,
) -> RelevanceResult<JobOutcome> {
    let config = match config_override {
        Some(config) => config,
        None => ctx.config.load().await?,
    };

    let lifecycle = ctx.lifecycle();
    let rebuild_id = lifecycle.start_rebuild().await?;

    with_breaker(ctx, async {
        ctx.repository
            .recreate_collections(&config.collection_spec())
            .await?;
        ctx.entries.reset_all_to_pending().await?;

        let entry_ids = ctx.entries.list_entry_ids().await?;
        for entry_id in &entry_ids {
            ctx.queue
                .enqueue(Job::GenerateEntryEmbedding {
                    entry_id: *entry_id,
                })
                .await?;
        }

        // Recreating collections dropped every preference vector too
        let user_ids = ctx.stats.users_with_stats().await?;
        for user_id in &user_ids {
            ctx.queue
                .enqueue(Job::RebuildUserPreference { user_id: *user_id })
                .await?;
        }

        info!(
            rebuild_id = %rebuild_id,
            entries = entry_ids.len(),
            users = user_ids.len(),
            "Rebuild fan-out queued"
        );
        Ok(JobOutcome::Completed(json!({
            "success": true,
            "rebuild_id": rebuild_id,
            "queued_entries": entry_ids.len(),
            "queued_preferences": user_ids.len(),
        })))
    })
    .await
}

/// Gate shared by the preference handlers: skip when off, defer while the
/// subsystem is validating or broken.
fn preference_gate(config: &VectorizationConfig) -> Option<JobOutcome> {
    if !config.enabled || config.status == VectorizationStatus::Disabled {
        return Some(JobOutcome::Skipped("vectorization disabled".to_string()));
    }
    match config.status {
        VectorizationStatus::Validating => Some(JobOutcome::Deferred(VALIDATING_RETRY)),
        VectorizationStatus::Error => Some(JobOutcome::Deferred(ERROR_RETRY)),
        _ => None,
    }
}

async fn update_user_preference(
    ctx: &JobContext,
    user_id: Uuid,
    entry_id: Uuid,
    signal: SignalType,
) -> RelevanceResult<JobOutcome> {
    let config = ctx.config.load().await?;
    if let Some(outcome) = preference_gate(&config) {
        return Ok(outcome);
    }

    with_breaker(ctx, async {
        ctx.repository
            .ensure_collections(&config.collection_spec())
            .await?;
        ctx.preference_service()
            .handle_signal(user_id, entry_id, signal)
            .await?;
        Ok(JobOutcome::Completed(json!({
            "user_id": user_id,
            "signal": signal.as_str(),
        })))
    })
    .await
}

async fn rebuild_user_preference(ctx: &JobContext, user_id: Uuid) -> RelevanceResult<JobOutcome> {
    let config = ctx.config.load().await?;
    if let Some(outcome) = preference_gate(&config) {
        return Ok(outcome);
    }

    with_breaker(ctx, async {
        ctx.repository
            .ensure_collections(&config.collection_spec())
            .await?;
        ctx.preference_service()
            .rebuild_from_history(user_id)
            .await?;
        Ok(JobOutcome::Completed(json!({ "user_id": user_id })))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_serialization_tags() {
        let job = Job::GenerateEntryEmbedding {
            entry_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["job"], "generate_entry_embedding");
        assert_eq!(json["entry_id"], Uuid::nil().to_string());

        let job = Job::UpdateUserPreference {
            user_id: Uuid::nil(),
            entry_id: Uuid::nil(),
            signal: SignalType::Bookmark,
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["job"], "update_user_preference");
        assert_eq!(json["signal"], "bookmark");
    }

    #[test]
    fn test_job_roundtrip() {
        let job = Job::RebuildEmbeddings { config: None };
        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: Job = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn test_preference_gate() {
        let mut config = VectorizationConfig::default();
        assert!(matches!(
            preference_gate(&config),
            Some(JobOutcome::Skipped(_))
        ));

        config.enabled = true;
        config.status = VectorizationStatus::Validating;
        assert!(matches!(
            preference_gate(&config),
            Some(JobOutcome::Deferred(d)) if d == VALIDATING_RETRY
        ));

        config.status = VectorizationStatus::Error;
        assert!(matches!(
            preference_gate(&config),
            Some(JobOutcome::Deferred(d)) if d == ERROR_RETRY
        ));

        config.status = VectorizationStatus::Idle;
        assert!(preference_gate(&config).is_none());
        config.status = VectorizationStatus::Rebuilding;
        assert!(preference_gate(&config).is_none());
    }
}
