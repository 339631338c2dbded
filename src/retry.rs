//! Bounded retry with exponential backoff.
//!
//! Every network-bound call in the pipeline goes through [`RetryPolicy::run`],
//! so the attempt budget and the backoff ceiling are the only knobs and both
//! are finite.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{DubError, Result};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Delay after the given failed attempt (1-based), capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exponent);
        delay.min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. The closure receives the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(DubError::Cancelled(format!("{} cancelled", label)));
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(DubError::Cancelled(format!("{} cancelled", label)));
                }
                outcome = op(attempt) => outcome,
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        label, attempt, self.max_attempts, delay, e
                    );
                    sleep_or_cancel(delay, cancel).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Sleep for `delay` unless the token fires first
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(DubError::Cancelled("cancelled while waiting to retry".to_string())),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
