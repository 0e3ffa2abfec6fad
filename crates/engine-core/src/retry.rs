use crate::error::ExecutionError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Indicates whether an error should be retried or treated as fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retry,
    Stop,
}

pub fn classify_execution_error(err: &ExecutionError) -> RetryDisposition {
    match err {
        ExecutionError::Transient(_) | ExecutionError::Timeout(_) => RetryDisposition::Retry,
        ExecutionError::Permanent(_) | ExecutionError::Cancelled => RetryDisposition::Stop,
    }
}

/// Bounded exponential backoff. `max_attempts` counts every attempt,
/// including the first one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: if max_delay.is_zero() {
                base_delay
            } else {
                max_delay
            },
        }
    }

    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Decides what happens after `attempt` (1-based) failed with `err`.
    /// Returns the delay before the next attempt, or `None` when the block
    /// must be given up on.
    pub fn next_delay(&self, attempt: u32, err: &ExecutionError) -> Option<Duration> {
        match classify_execution_error(err) {
            RetryDisposition::Stop => None,
            RetryDisposition::Retry if attempt >= self.max_attempts => None,
            RetryDisposition::Retry => Some(self.backoff_delay(attempt.saturating_sub(1))),
        }
    }

    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::from_millis(0);
        }

        let factor = 1u128 << attempt.min(6);
        let base_ms = self.base_delay.as_millis();
        let delay_ms = base_ms.saturating_mul(factor);
        let capped = delay_ms.min(self.max_delay.as_millis());
        Duration::from_millis(capped as u64)
    }
}
