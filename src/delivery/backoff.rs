//! Retry policy and injectable waiting

use std::time::Duration;

/// Bounded exponential retry policy.
///
/// `max_attempts` counts every attempt, including the first. The wait after
/// failed attempt `n` (0-based) is `base_delay * 2^n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts: max_attempts.max(1), ..Self::default() }
    }

    /// Wait before the attempt following failed attempt `attempt`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_secs(1) }
    }
}

/// Waiting strategy between delivery attempts
#[async_trait::async_trait]
pub trait Backoff: Send + Sync {
    async fn wait(&self, delay: Duration);
}

/// Real waiting on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioBackoff;

#[async_trait::async_trait]
impl Backoff for TokioBackoff {
    async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Backoff that returns immediately and remembers every requested delay
#[cfg(any(test, feature = "benchmark"))]
#[derive(Debug, Default)]
pub struct RecordingBackoff {
    waits: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(any(test, feature = "benchmark"))]
impl RecordingBackoff {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

#[cfg(any(test, feature = "benchmark"))]
#[async_trait::async_trait]
impl Backoff for RecordingBackoff {
    async fn wait(&self, delay: Duration) {
        if let Ok(mut waits) = self.waits.lock() {
            waits.push(delay);
        }
    }
}
