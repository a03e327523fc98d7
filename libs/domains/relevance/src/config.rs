use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RelevanceResult;
use crate::models::CollectionSpec;

/// State machine for the vectorization subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorizationStatus {
    Disabled,
    Idle,
    Validating,
    Rebuilding,
    Error,
}

impl VectorizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorizationStatus::Disabled => "disabled",
            VectorizationStatus::Idle => "idle",
            VectorizationStatus::Rebuilding => "rebuilding",
            VectorizationStatus::Validating => "validating",
            VectorizationStatus::Error => "error",
        }
    }

    /// Working states: embedding and preference jobs may run.
    pub fn is_working(&self) -> bool {
        matches!(
            self,
            VectorizationStatus::Idle | VectorizationStatus::Rebuilding
        )
    }
}

fn default_status() -> VectorizationStatus {
    VectorizationStatus::Disabled
}

/// Requests-per-minute limits, with per-provider overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit")]
    pub default: u32,
    #[serde(default)]
    pub providers: HashMap<String, u32>,
}

fn default_rate_limit() -> u32 {
    10
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default: default_rate_limit(),
            providers: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Effective rpm for a provider; 0 disables limiting.
    pub fn for_provider(&self, provider: &str) -> u32 {
        self.providers
            .get(provider)
            .copied()
            .unwrap_or(self.default)
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimension() -> usize {
    1536
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    20
}

fn default_max_retries() -> u32 {
    3
}

/// Typed configuration record for the vectorization subsystem.
///
/// Persisted as one JSON blob under [`VectorizationConfig::NAMESPACE`] through
/// a [`ConfigStore`]; every field carries a serde default so partial blobs
/// written by older versions load cleanly. Besides provider settings it holds
/// the state machine fields (status, error counter, rebuild bookkeeping) so
/// transient workers share one source of truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default = "default_status")]
    pub status: VectorizationStatus,
    /// Bumped whenever a compatibility-relevant field changes.
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_error_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default)]
    pub rebuild_id: Option<String>,
    #[serde(default)]
    pub rebuild_started_at: Option<DateTime<Utc>>,
}

impl Default for VectorizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: default_model(),
            dimension: default_dimension(),
            api_key: String::new(),
            base_url: None,
            timeout_secs: default_timeout_secs(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            rate_limit: RateLimitConfig::default(),
            status: default_status(),
            version: None,
            last_error: None,
            last_error_at: None,
            error_count: 0,
            rebuild_id: None,
            rebuild_started_at: None,
        }
    }
}

impl VectorizationConfig {
    /// Storage key in the system config store.
    pub const NAMESPACE: &'static str = "embedding";

    pub fn signature(&self) -> String {
        self.collection_spec().signature()
    }

    pub fn collection_spec(&self) -> CollectionSpec {
        CollectionSpec {
            provider: self.provider.clone(),
            model: self.model.clone(),
            dimension: self.dimension,
        }
    }

    pub fn rate_limit_rpm(&self) -> u32 {
        self.rate_limit.for_provider(&self.provider)
    }

    /// True when the subsystem should accept work right now.
    pub fn is_operational(&self) -> bool {
        self.enabled && self.status.is_working()
    }

    /// Whether switching to `other` invalidates every stored vector.
    pub fn requires_rebuild(&self, other: &VectorizationConfig) -> bool {
        self.provider != other.provider
            || self.model != other.model
            || self.dimension != other.dimension
            || self.api_key != other.api_key
            || self.base_url != other.base_url
    }
}

/// Partial update applied through the lifecycle service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub dimension: Option<usize>,
    pub api_key: Option<String>,
    pub base_url: Option<Option<String>>,
    pub timeout_secs: Option<u64>,
    pub batch_size: Option<usize>,
    pub max_retries: Option<u32>,
    pub rate_limit: Option<RateLimitConfig>,
}

impl ConfigUpdate {
    pub fn apply(&self, config: &mut VectorizationConfig) {
        if let Some(provider) = &self.provider {
            config.provider = provider.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(dimension) = self.dimension {
            config.dimension = dimension;
        }
        if let Some(api_key) = &self.api_key {
            config.api_key = api_key.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(rate_limit) = &self.rate_limit {
            config.rate_limit = rate_limit.clone();
        }
    }
}

/// Persistence seam for the typed config record
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the stored record, falling back to defaults when absent.
    async fn load(&self) -> RelevanceResult<VectorizationConfig>;

    /// Persist the whole record.
    async fn store(&self, config: &VectorizationConfig) -> RelevanceResult<()>;
}
