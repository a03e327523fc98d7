use crate::error::RelevanceResult;

/// Milvus connection configuration
#[derive(Debug, Clone)]
pub struct MilvusConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
    pub entries_collection: String,
    pub prefs_collection: String,
}

impl MilvusConfig {
    pub fn new(url: String) -> Self {
        Self {
            url,
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn from_env() -> RelevanceResult<Self> {
        let url =
            std::env::var("MILVUS_URL").unwrap_or_else(|_| "http://localhost:19530".to_string());

        let username = std::env::var("MILVUS_USERNAME").ok().filter(|s| !s.is_empty());
        let password = std::env::var("MILVUS_PASSWORD").ok().filter(|s| !s.is_empty());

        let timeout_secs = std::env::var("MILVUS_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let entries_collection =
            std::env::var("MILVUS_ENTRIES_COLLECTION").unwrap_or_else(|_| "entries".to_string());
        let prefs_collection = std::env::var("MILVUS_PREFS_COLLECTION")
            .unwrap_or_else(|_| "user_preferences".to_string());

        Ok(Self {
            url,
            username,
            password,
            timeout_secs,
            entries_collection,
            prefs_collection,
        })
    }
}

impl Default for MilvusConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:19530".to_string(),
            username: None,
            password: None,
            timeout_secs: 10,
            entries_collection: "entries".to_string(),
            prefs_collection: "user_preferences".to_string(),
        }
    }
}
