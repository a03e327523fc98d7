use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter.
///
/// `acquire` waits until the number of calls in the trailing 60 seconds is
/// below the configured maximum, then records the call. It throttles but
/// never rejects. A limit of 0 disables throttling.
pub struct RateLimiter {
    max_per_minute: u32,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn acquire(&self) {
        if self.max_per_minute == 0 {
            return;
        }

        loop {
            let now = Instant::now();
            let mut stamps = self.timestamps.lock().await;

            while let Some(front) = stamps.front() {
                if now.duration_since(*front) >= WINDOW {
                    stamps.pop_front();
                } else {
                    break;
                }
            }

            if (stamps.len() as u32) < self.max_per_minute {
                stamps.push_back(now);
                return;
            }

            // Wait for the oldest call to leave the window, without holding
            // the queue.
            let oldest = *stamps.front().unwrap_or(&now);
            drop(stamps);
            let wait = WINDOW.saturating_sub(now.duration_since(oldest));
            debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Calls currently inside the window (diagnostics).
    pub async fn current_usage(&self) -> usize {
        let now = Instant::now();
        let stamps = self.timestamps.lock().await;
        stamps
            .iter()
            .filter(|t| now.duration_since(**t) < WINDOW)
            .count()
    }
}
