use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Duration, TimeZone, Utc};
use domain_relevance::models::{EmbeddingStatus, Entry};
use uuid::Uuid;

/// Seeded fixture builder: ids and timestamps derive from the test name, so
/// a failing test reproduces with identical data.
pub struct TestDataBuilder {
    seed: u64,
    counter: u64,
    base_time: DateTime<Utc>,
}

impl TestDataBuilder {
    pub fn new(test_name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        test_name.hash(&mut hasher);
        Self {
            seed: hasher.finish(),
            counter: 0,
            base_time: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    /// Next deterministic UUID for this test.
    pub fn uuid(&mut self) -> Uuid {
        self.counter += 1;
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&self.seed.to_be_bytes());
        bytes[8..].copy_from_slice(&self.counter.to_be_bytes());
        Uuid::from_bytes(bytes)
    }

    /// Next timestamp, one minute after the previous one.
    pub fn timestamp(&mut self) -> DateTime<Utc> {
        self.counter += 1;
        self.base_time + Duration::minutes(self.counter as i64)
    }

    /// A pending entry with content, belonging to `feed_id`.
    pub fn entry(&mut self, feed_id: Uuid, title: &str) -> Entry {
        let id = self.uuid();
        let at = self.timestamp();
        Entry {
            id,
            feed_id,
            title: title.to_string(),
            content: Some(format!("Content of {title}.")),
            summary: None,
            author: None,
            published_at: Some(at),
            embedding_status: EmbeddingStatus::Pending,
            embedding_error: None,
            embedding_at: None,
            word_count: None,
            created_at: at,
            updated_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_name_same_ids() {
        let a = TestDataBuilder::new("t").uuid();
        let b = TestDataBuilder::new("t").uuid();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_names_differ() {
        let a = TestDataBuilder::new("t1").uuid();
        let b = TestDataBuilder::new("t2").uuid();
        assert_ne!(a, b);
    }
}
