//! Exponential backoff with jitter plus a retriable-error classifier.
//!
//! Single source of truth for retry behavior in the crate; the chat
//! provider's `chat_with_retry` calls through here instead of running its
//! own backoff loop.

use crate::errors::BuckleyError;
use rand::Rng;
use rand::rngs::OsRng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy: delay on attempt n (n>0) = clip(base * multiplier^(n-1), base, max) * jitter,
/// jitter drawn uniformly from [0.75, 1.25] via a cryptographic RNG.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Total attempts = max_retries + 1.
    pub fn total_attempts(&self) -> usize {
        self.max_retries + 1
    }

    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        debug_assert!(attempt > 0);
        let base = self.base_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let raw = base * self.multiplier.powi(attempt as i32 - 1);
        let clipped = raw.clamp(base, max);
        let jitter = OsRng.random_range(0.75..=1.25);
        Duration::from_secs_f64(clipped * jitter)
    }
}

/// Run `op` under the retry policy, stopping early on cancellation or a
/// non-retriable classification.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, BuckleyError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BuckleyError>>,
{
    let mut last_err = None;
    for attempt in 0..policy.total_attempts() {
        if attempt > 0 {
            let delay = policy.delay_for_attempt(attempt);
            debug!(
                "retrying (attempt {}/{}) after {:?}",
                attempt + 1,
                policy.total_attempts(),
                delay
            );
            tokio::time::sleep(delay).await;
        }
        match op().await {
            Ok(v) => return Ok(v),
            Err(BuckleyError::Canceled) => return Err(BuckleyError::Canceled),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                warn!("attempt {} failed, retriable: {}", attempt + 1, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or(BuckleyError::Fatal("all retry attempts exhausted".into())))
}

#[cfg(test)]
mod tests;
