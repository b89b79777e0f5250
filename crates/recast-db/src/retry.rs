//! Retry with exponential backoff for transient driver failures.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::Result;

/// Backoff parameters, deserializable from application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub initial_delay_ms: u64,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            backoff: 1.5,
        }
    }
}

impl RetryPolicy {
    /// Runs `op` until it succeeds, fails with a non-retryable error, or
    /// exhausts the attempt budget. Only [`DbError::is_retryable`] errors
    /// are retried.
    ///
    /// [`DbError::is_retryable`]: crate::error::DbError::is_retryable
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the first
    /// non-retryable error immediately.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.run_with_sleep(op, tokio::time::sleep).await
    }

    // Separated so tests can observe delays without waiting them out.
    pub(crate) async fn run_with_sleep<T, F, Fut, S, SFut>(&self, mut op: F, sleep: S) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        S: Fn(Duration) -> SFut,
        SFut: Future<Output = ()>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut delay = Duration::from_millis(self.initial_delay_ms);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    warn!(attempt, max_attempts, %err, delay_ms = delay.as_millis() as u64, "retrying after transient failure");
                    sleep(delay).await;
                    delay = Duration::from_secs_f64(delay.as_secs_f64() * self.backoff);
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        error!(max_attempts, %err, "giving up after exhausting retries");
                    }
                    return Err(err);
                }
            }
        }
    }
}
