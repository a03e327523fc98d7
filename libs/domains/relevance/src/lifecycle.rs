use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{ConfigStore, ConfigUpdate, VectorizationConfig, VectorizationStatus};
use crate::error::RelevanceResult;
use crate::jobs::{Job, JobQueue};
use crate::models::EmbeddingCounts;
use crate::store::EntryStore;

/// Consecutive infrastructure failures that trip the subsystem into `error`.
pub const CONSECUTIVE_FAILURE_THRESHOLD: u32 = 5;

/// Point-in-time view of the subsystem, with rebuild progress when one is
/// running.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub enabled: bool,
    pub status: VectorizationStatus,
    pub signature: String,
    pub last_error: Option<String>,
    pub error_count: u32,
    pub rebuild_id: Option<String>,
    pub rebuild_started_at: Option<DateTime<Utc>>,
    pub progress: Option<EmbeddingCounts>,
}

/// Drives the persisted state machine:
///
/// ```text
/// disabled -> validating -> rebuilding -> idle
///                  |              \______/|
///                  v        (config change)
///                error <- circuit breaker
/// ```
///
/// All state lives in the [`VectorizationConfig`] record so any number of
/// transient workers observe the same machine.
pub struct VectorizationLifecycle {
    config: Arc<dyn ConfigStore>,
    entries: Arc<dyn EntryStore>,
    queue: Arc<dyn JobQueue>,
}

impl VectorizationLifecycle {
    pub fn new(
        config: Arc<dyn ConfigStore>,
        entries: Arc<dyn EntryStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            config,
            entries,
            queue,
        }
    }

    /// Enable the subsystem. Always passes through `validating`: the stored
    /// provider settings are re-proven before any vector is written.
    pub async fn enable(&self) -> RelevanceResult<VectorizationConfig> {
        let mut config = self.config.load().await?;
        config.enabled = true;
        config.status = VectorizationStatus::Validating;
        self.config.store(&config).await?;

        self.queue.enqueue(Job::ValidateAndRebuild).await?;
        info!("Vectorization enabled, validation queued");
        Ok(config)
    }

    /// Disable immediately. Idempotent; stored vectors are kept.
    pub async fn disable(&self) -> RelevanceResult<VectorizationConfig> {
        let mut config = self.config.load().await?;
        if !config.enabled && config.status == VectorizationStatus::Disabled {
            return Ok(config);
        }
        config.enabled = false;
        config.status = VectorizationStatus::Disabled;
        self.config.store(&config).await?;
        info!("Vectorization disabled");
        Ok(config)
    }

    /// Apply a partial config update. Changes that invalidate stored vectors
    /// (provider, model, dimension, credentials, endpoint) bump the version
    /// and, when enabled, force re-validation and a rebuild.
    pub async fn update_config(
        &self,
        update: ConfigUpdate,
    ) -> RelevanceResult<VectorizationConfig> {
        let before = self.config.load().await?;
        let mut config = before.clone();
        update.apply(&mut config);

        if before.requires_rebuild(&config) {
            config.version = Some(Uuid::new_v4().to_string());
            if config.enabled {
                config.status = VectorizationStatus::Validating;
            }
            self.config.store(&config).await?;

            if config.enabled {
                self.queue.enqueue(Job::ValidateAndRebuild).await?;
                info!(
                    signature = %config.signature(),
                    version = config.version.as_deref().unwrap_or(""),
                    "Embedding space changed, revalidation queued"
                );
            }
        } else {
            self.config.store(&config).await?;
        }

        Ok(config)
    }

    /// Count one infrastructure failure. Returns true when this failure
    /// tripped the breaker into `error`.
    pub async fn record_failure(&self, error_message: &str) -> RelevanceResult<bool> {
        let mut config = self.config.load().await?;
        config.error_count += 1;
        config.last_error = Some(error_message.to_string());
        config.last_error_at = Some(Utc::now());

        let tripped = config.error_count >= CONSECUTIVE_FAILURE_THRESHOLD
            && config.status != VectorizationStatus::Error;
        if tripped {
            config.status = VectorizationStatus::Error;
            config.last_error = Some(format!(
                "Circuit breaker tripped after {} consecutive failures: {}",
                config.error_count, error_message
            ));
            error!(
                error_count = config.error_count,
                error = error_message,
                "Vectorization circuit breaker tripped"
            );
        } else {
            warn!(
                error_count = config.error_count,
                error = error_message,
                "Vectorization task failed"
            );
        }

        self.config.store(&config).await?;
        Ok(tripped)
    }

    /// A successful task resets the consecutive-failure counter.
    pub async fn record_success(&self) -> RelevanceResult<()> {
        let config = self.config.load().await?;
        if config.error_count == 0 {
            return Ok(());
        }
        let mut config = config;
        config.error_count = 0;
        self.config.store(&config).await
    }

    /// Record a failed validation: straight to `error` with the message.
    pub async fn fail_validation(&self, message: &str) -> RelevanceResult<()> {
        let mut config = self.config.load().await?;
        config.status = VectorizationStatus::Error;
        config.last_error = Some(message.to_string());
        config.last_error_at = Some(Utc::now());
        config.error_count += 1;
        self.config.store(&config).await?;
        warn!(error = message, "Validation failed");
        Ok(())
    }

    /// Mark a rebuild started and return its id.
    pub async fn start_rebuild(&self) -> RelevanceResult<String> {
        let mut config = self.config.load().await?;
        let rebuild_id = Uuid::new_v4().to_string();
        config.status = VectorizationStatus::Rebuilding;
        config.rebuild_id = Some(rebuild_id.clone());
        config.rebuild_started_at = Some(Utc::now());
        self.config.store(&config).await?;
        info!(rebuild_id = %rebuild_id, "Rebuild started");
        Ok(rebuild_id)
    }

    /// Mark the running rebuild finished and clear error state.
    pub async fn complete_rebuild(&self) -> RelevanceResult<()> {
        let mut config = self.config.load().await?;
        config.status = VectorizationStatus::Idle;
        config.rebuild_id = None;
        config.rebuild_started_at = None;
        config.error_count = 0;
        config.last_error = None;
        self.config.store(&config).await?;
        info!("Rebuild complete, vectorization idle");
        Ok(())
    }

    /// Current status. While `rebuilding` this also reads progress counts
    /// and auto-completes the rebuild once every entry reached a terminal
    /// status.
    pub async fn status(&self) -> RelevanceResult<StatusSnapshot> {
        let mut config = self.config.load().await?;
        let mut progress = None;

        if config.status == VectorizationStatus::Rebuilding {
            let counts = self.entries.embedding_counts().await?;
            if counts.is_complete() {
                self.complete_rebuild().await?;
                config = self.config.load().await?;
            }
            progress = Some(counts);
        }

        Ok(StatusSnapshot {
            enabled: config.enabled,
            status: config.status,
            signature: config.signature(),
            last_error: config.last_error,
            error_count: config.error_count,
            rebuild_id: config.rebuild_id,
            rebuild_started_at: config.rebuild_started_at,
            progress,
        })
    }
}
