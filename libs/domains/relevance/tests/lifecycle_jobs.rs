//! Full job-driven lifecycle: enable, validate, rebuild, steady state,
//! config changes and the circuit breaker, all through `run_job`.

use std::sync::Arc;
use std::time::Duration;

use domain_relevance::config::{ConfigStore, ConfigUpdate, VectorizationConfig, VectorizationStatus};
use domain_relevance::embedding::{EmbeddingProvider, ProviderRegistry};
use domain_relevance::error::RelevanceResult;
use domain_relevance::jobs::{Job, JobContext, JobOutcome, run_job};
use domain_relevance::models::{Polarity, SignalType};
use domain_relevance::services::ScoreService;
use test_utils::{
    InMemoryConfigStore, InMemoryEntryStore, InMemoryStatsStore, InMemoryVectorStore,
    LocalLockManager, RecordingQueue, StaticProvider, TestDataBuilder,
};
use uuid::Uuid;

fn static_factory(config: &VectorizationConfig) -> RelevanceResult<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(StaticProvider::new(config.dimension)))
}

fn static_config() -> VectorizationConfig {
    VectorizationConfig {
        provider: "static".to_string(),
        model: "static-test".to_string(),
        dimension: 8,
        ..VectorizationConfig::default()
    }
}

struct World {
    repo: Arc<InMemoryVectorStore>,
    entries: Arc<InMemoryEntryStore>,
    stats: Arc<InMemoryStatsStore>,
    config: Arc<InMemoryConfigStore>,
    queue: Arc<RecordingQueue>,
}

impl World {
    fn new(config: VectorizationConfig) -> Self {
        Self {
            repo: Arc::new(InMemoryVectorStore::new()),
            entries: Arc::new(InMemoryEntryStore::new()),
            stats: Arc::new(InMemoryStatsStore::new()),
            config: Arc::new(InMemoryConfigStore::new(config)),
            queue: Arc::new(RecordingQueue::new()),
        }
    }

    fn ctx(&self) -> JobContext {
        let mut registry = ProviderRegistry::new();
        registry.register("static", static_factory);
        JobContext {
            repository: self.repo.clone(),
            entries: self.entries.clone(),
            stats: self.stats.clone(),
            config: self.config.clone(),
            locks: Arc::new(LocalLockManager::new()),
            queue: self.queue.clone(),
            registry: Arc::new(registry),
        }
    }

    /// Run queued jobs, including the ones they enqueue, until none remain.
    async fn pump(&self, ctx: &JobContext) {
        loop {
            let jobs = self.queue.drain().await;
            if jobs.is_empty() {
                return;
            }
            for job in jobs {
                run_job(ctx, job).await.unwrap();
            }
        }
    }
}

#[tokio::test]
async fn enable_validates_rebuilds_and_settles_idle() {
    let mut data = TestDataBuilder::new("enable_to_idle");
    let world = World::new(static_config());
    let feed = data.uuid();
    for i in 0..3 {
        world.entries.insert(data.entry(feed, &format!("Entry {i}"))).await;
    }

    let ctx = world.ctx();
    let lifecycle = ctx.lifecycle();

    let enabled = lifecycle.enable().await.unwrap();
    assert_eq!(enabled.status, VectorizationStatus::Validating);
    assert_eq!(world.queue.len().await, 1);

    world.pump(&ctx).await;

    assert_eq!(world.repo.entry_count().await, 3);
    assert_eq!(world.repo.recreate_count().await, 1);
    assert_eq!(
        world.repo.stored_signature().await.unwrap(),
        "static:static-test:8"
    );

    // Every entry is terminal, so the status read completes the rebuild
    let snapshot = lifecycle.status().await.unwrap();
    assert_eq!(snapshot.status, VectorizationStatus::Idle);
    assert!(snapshot.rebuild_id.is_none());
    let progress = snapshot.progress.unwrap();
    assert_eq!(progress.total, 3);
    assert_eq!(progress.done, 3);
}

#[tokio::test]
async fn model_change_rebuilds_vectors_and_preferences() {
    let mut data = TestDataBuilder::new("model_change_rebuild");
    let world = World::new(static_config());
    let feed = data.uuid();
    let user = data.uuid();

    let entry = data.entry(feed, "Liked entry");
    let entry_id = entry.id;
    world.entries.insert(entry).await;
    world.entries.insert(data.entry(feed, "Other entry")).await;

    let ctx = world.ctx();
    let lifecycle = ctx.lifecycle();
    lifecycle.enable().await.unwrap();
    world.pump(&ctx).await;
    lifecycle.status().await.unwrap();

    // Feedback lands while idle; the host also records it in the history
    world.stats.push_feedback(user, entry_id, SignalType::Like).await;
    let outcome = run_job(
        &ctx,
        Job::UpdateUserPreference {
            user_id: user,
            entry_id,
            signal: SignalType::Like,
        },
    )
    .await
    .unwrap();
    assert!(matches!(outcome, JobOutcome::Completed(_)));
    assert!(world.repo.preference(user, Polarity::Positive).await.is_some());

    let recreates_before = world.repo.recreate_count().await;
    let updated = lifecycle
        .update_config(ConfigUpdate {
            model: Some("static-v2".to_string()),
            ..ConfigUpdate::default()
        })
        .await
        .unwrap();
    assert!(updated.version.is_some());
    assert_eq!(updated.status, VectorizationStatus::Validating);

    world.pump(&ctx).await;
    let snapshot = lifecycle.status().await.unwrap();
    assert_eq!(snapshot.status, VectorizationStatus::Idle);
    assert_eq!(snapshot.signature, "static:static-v2:8");

    // New space: collections recreated, entries re-embedded, the preference
    // model replayed from history
    assert_eq!(world.repo.recreate_count().await, recreates_before + 1);
    assert_eq!(world.repo.entry_count().await, 2);
    assert_eq!(
        world.repo.stored_signature().await.unwrap(),
        "static:static-v2:8"
    );
    let positive = world.repo.preference(user, Polarity::Positive).await.unwrap();
    assert_eq!(positive.sample_count, 1.0);

    // The liked entry scores above neutral against the rebuilt model
    let scores = ScoreService::new(
        world.entries.clone(),
        world.stats.clone(),
        world.repo.clone(),
    );
    let breakdown = scores.score_entry(user, entry_id).await.unwrap();
    assert!(breakdown.score > 50.0);
    assert!(breakdown.positive_sim > 0.9);
}

#[tokio::test]
async fn failed_validation_parks_in_error_without_rebuild() {
    let world = World::new(VectorizationConfig {
        provider: "missing".to_string(),
        ..static_config()
    });
    let ctx = world.ctx();
    let lifecycle = ctx.lifecycle();

    lifecycle.enable().await.unwrap();
    world.pump(&ctx).await;

    let snapshot = lifecycle.status().await.unwrap();
    assert_eq!(snapshot.status, VectorizationStatus::Error);
    assert!(
        snapshot
            .last_error
            .unwrap()
            .contains("Unknown embedding provider")
    );
    assert_eq!(world.repo.recreate_count().await, 0);
    assert!(world.queue.is_empty().await);
}

#[tokio::test]
async fn breaker_trips_after_consecutive_failures_only() {
    let mut data = TestDataBuilder::new("breaker_consecutive");
    let mut config = static_config();
    config.provider = "missing".to_string();
    config.enabled = true;
    config.status = VectorizationStatus::Idle;
    let world = World::new(config);
    let ctx = world.ctx();
    let entry_id = data.uuid();

    let fail_once = || run_job(&ctx, Job::GenerateEntryEmbedding { entry_id });

    for _ in 0..4 {
        fail_once().await.unwrap_err();
    }
    let snapshot = ctx.lifecycle().status().await.unwrap();
    assert_eq!(snapshot.status, VectorizationStatus::Idle);
    assert_eq!(snapshot.error_count, 4);

    // A clean run resets the streak
    let mut fixed = world.config.snapshot().await;
    fixed.provider = "static".to_string();
    world.config.store(&fixed).await.unwrap();
    let outcome = fail_once().await.unwrap();
    assert!(matches!(outcome, JobOutcome::Completed(_)));
    assert_eq!(ctx.lifecycle().status().await.unwrap().error_count, 0);

    let mut broken = world.config.snapshot().await;
    broken.provider = "missing".to_string();
    world.config.store(&broken).await.unwrap();
    for _ in 0..4 {
        fail_once().await.unwrap_err();
        assert_eq!(
            ctx.lifecycle().status().await.unwrap().status,
            VectorizationStatus::Idle
        );
    }

    // The fifth consecutive failure trips the breaker
    fail_once().await.unwrap_err();
    let snapshot = ctx.lifecycle().status().await.unwrap();
    assert_eq!(snapshot.status, VectorizationStatus::Error);
    assert!(snapshot.last_error.unwrap().contains("Circuit breaker"));

    // Broken subsystem stops taking embedding work
    let outcome = fail_once().await.unwrap();
    assert!(matches!(outcome, JobOutcome::Skipped(_)));
}

#[tokio::test]
async fn preference_jobs_defer_until_the_subsystem_settles() {
    let mut data = TestDataBuilder::new("preference_defers");
    let mut config = static_config();
    config.enabled = true;
    config.status = VectorizationStatus::Validating;
    let world = World::new(config);
    let ctx = world.ctx();

    let job = Job::UpdateUserPreference {
        user_id: data.uuid(),
        entry_id: data.uuid(),
        signal: SignalType::Like,
    };

    let outcome = run_job(&ctx, job.clone()).await.unwrap();
    assert!(matches!(
        outcome,
        JobOutcome::Deferred(d) if d == Duration::from_secs(30)
    ));

    let mut errored = world.config.snapshot().await;
    errored.status = VectorizationStatus::Error;
    world.config.store(&errored).await.unwrap();
    let outcome = run_job(&ctx, job.clone()).await.unwrap();
    assert!(matches!(
        outcome,
        JobOutcome::Deferred(d) if d == Duration::from_secs(120)
    ));

    let mut disabled = world.config.snapshot().await;
    disabled.enabled = false;
    disabled.status = VectorizationStatus::Disabled;
    world.config.store(&disabled).await.unwrap();
    let outcome = run_job(&ctx, job).await.unwrap();
    assert!(matches!(outcome, JobOutcome::Skipped(_)));
}

#[tokio::test]
async fn disabled_subsystem_skips_embedding_work() {
    let world = World::new(static_config());
    let ctx = world.ctx();

    let outcome = run_job(
        &ctx,
        Job::GenerateEntryEmbedding {
            entry_id: Uuid::nil(),
        },
    )
    .await
    .unwrap();
    assert!(matches!(outcome, JobOutcome::Skipped(_)));

    let outcome = run_job(&ctx, Job::BatchGenerateEmbeddings { limit: 10 })
        .await
        .unwrap();
    assert!(matches!(outcome, JobOutcome::Skipped(_)));
    assert_eq!(world.repo.entry_count().await, 0);
}
