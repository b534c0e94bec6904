use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Polling scheduler with optional jitter
pub struct PollingScheduler {
    poll_interval: Duration,
    retry_interval: Duration,
    jitter_range: Duration,
}

impl PollingScheduler {
    /// Create a new polling scheduler
    ///
    /// # Arguments
    /// * `interval_secs` - Delay after a successful check
    /// * `retry_secs` - Delay after a failed fetch
    /// * `jitter_secs` - Maximum jitter added to either delay
    pub fn new(interval_secs: u64, retry_secs: u64, jitter_secs: u64) -> Self {
        Self {
            poll_interval: Duration::from_secs(interval_secs),
            retry_interval: Duration::from_secs(retry_secs),
            jitter_range: Duration::from_secs(jitter_secs),
        }
    }

    /// Delay before the next tick
    pub fn next_delay(&self, fetch_failed: bool) -> Duration {
        let base = if fetch_failed {
            self.retry_interval
        } else {
            self.poll_interval
        };
        base + self.random_jitter()
    }

    /// Wall-clock time a delay will end at
    pub fn next_poll_time(&self, delay: Duration) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        let now = Utc::now();
        now.checked_add_signed(delay).unwrap_or(now)
    }

    /// Sleep for `delay` unless cancelled first
    ///
    /// Returns `false` when cancellation ended the sleep.
    pub async fn sleep_or_cancel(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tracing::debug!("Sleeping for {} seconds until next poll", delay.as_secs());
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Generate random jitter in range [0, jitter_range]
    fn random_jitter(&self) -> Duration {
        if self.jitter_range.is_zero() {
            return Duration::ZERO;
        }
        let jitter_secs = rand::thread_rng().gen_range(0..=self.jitter_range.as_secs());
        Duration::from_secs(jitter_secs)
    }
}

impl Default for PollingScheduler {
    fn default() -> Self {
        Self::new(10, 10, 0)
    }
}
