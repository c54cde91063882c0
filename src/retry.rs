//! Exponential backoff for idempotent reads
//!
//! Quote and execute calls never go through here: resubmitting a signed
//! payload has side effects.

use crate::error::{EngineError, EngineResult};

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total tries, including the first one
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Additive jitter as a fraction of the backoff delay
    pub jitter: f64,
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (1-based), without jitter
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// The full sleep schedule between attempts, without jitter
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.attempts).map(|retry| self.backoff(retry)).collect()
    }

    fn jittered(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        if self.jitter <= 0.0 {
            return delay;
        }
        let max_extra = delay.as_millis() as f64 * self.jitter;
        let extra = rand::thread_rng().gen_range(0.0..=max_extra);
        delay + Duration::from_millis(extra as u64)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent
    pub async fn run<F, Fut, T>(&self, operation: &str, mut op: F) -> EngineResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < self.attempts => {
                    let delay = self.jittered(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        operation, attempt, self.attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: 0.2,
        }
    }
}

/// Bound a future by `limit`, mapping expiry to [`EngineError::Timeout`]
pub async fn with_timeout<Fut, T>(limit: Duration, operation: &str, fut: Fut) -> EngineResult<T>
where
    Fut: Future<Output = EngineResult<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| EngineError::Timeout {
            operation: operation.to_string(),
        })?
}
