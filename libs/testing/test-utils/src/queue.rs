use async_trait::async_trait;
use domain_relevance::error::RelevanceResult;
use domain_relevance::jobs::{Job, JobQueue};
use tokio::sync::Mutex;

/// Queue that records enqueued jobs instead of delivering them.
#[derive(Default)]
pub struct RecordingQueue {
    jobs: Mutex<Vec<Job>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take all recorded jobs, clearing the queue.
    pub async fn drain(&self) -> Vec<Job> {
        std::mem::take(&mut *self.jobs.lock().await)
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, job: Job) -> RelevanceResult<()> {
        self.jobs.lock().await.push(job);
        Ok(())
    }
}
