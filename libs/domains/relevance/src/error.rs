use thiserror::Error;

/// Errors for the relevance domain
#[derive(Debug, Error)]
pub enum RelevanceError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelevanceError {
    /// True for the "collection missing" class of store failures, which the
    /// Milvus repository heals by re-running the ensure path once.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RelevanceError::CollectionNotFound(_))
    }
}

/// Result type for relevance operations
pub type RelevanceResult<T> = Result<T, RelevanceError>;

// Convert from common error types
impl From<reqwest::Error> for RelevanceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelevanceError::Timeout(err.to_string())
        } else {
            RelevanceError::Store(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RelevanceError {
    fn from(err: serde_json::Error) -> Self {
        RelevanceError::Internal(format!("Serialization error: {}", err))
    }
}

impl From<redis::RedisError> for RelevanceError {
    fn from(err: redis::RedisError) -> Self {
        RelevanceError::Internal(format!("Redis error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        assert!(RelevanceError::CollectionNotFound("entries".to_string()).is_not_found());
        assert!(!RelevanceError::Store("boom".to_string()).is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = RelevanceError::Embedding("dimension mismatch".to_string());
        assert_eq!(err.to_string(), "Embedding error: dimension mismatch");
    }
}
