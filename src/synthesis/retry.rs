/*!
 * Retry with exponential backoff.
 *
 * A single combinator wraps any fallible backend call. Only transient
 * failures are repeated; the delay before retry `n` (0-based) is
 * `base_delay * 2^n`, capped at `max_delay`. Sleeping is interrupted by
 * cancellation.
 */

use log::warn;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::errors::BackendError;

/// Bounded retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry (0 for the first retry)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// A successful call and how many retries it took
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub retries: u32,
}

/// Why a retried call gave up
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError {
    /// Transient failures on every attempt
    Exhausted { error: BackendError, attempts: u32 },
    /// A non-transient failure, not retried
    Rejected { error: BackendError, attempts: u32 },
    /// Cancelled before or between attempts
    Cancelled,
}

/// Run `operation` under `policy`, retrying transient failures
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<RetryOutcome<T>, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        attempt += 1;

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = operation() => result,
        };

        match result {
            Ok(value) => {
                return Ok(RetryOutcome {
                    value,
                    retries: attempt - 1,
                });
            }
            Err(error) if !error.is_transient() => {
                return Err(RetryError::Rejected {
                    error,
                    attempts: attempt,
                });
            }
            Err(error) if attempt >= max_attempts => {
                return Err(RetryError::Exhausted {
                    error,
                    attempts: attempt,
                });
            }
            Err(error) => {
                let delay = policy.delay_for(attempt - 1);
                warn!(
                    "{}: attempt {}/{} failed: {}; retrying in {:?}",
                    label, attempt, max_attempts, error, delay
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
