//! Generic exponential-backoff retry wrapper.
//!
//! Used by the rate source clients to survive transient network and
//! server failures without amplifying load on hard client errors: a 4xx
//! other than 429 is rethrown immediately, while 429/5xx/transport
//! failures are retried with pure exponential backoff.

use crate::errors::{ChainPayError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Default number of attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between attempts.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(300);

/// Attempt count and backoff base for [`retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of invocations of the wrapped operation
    pub max_attempts: u32,

    /// Delay after the first failed attempt; doubles each retry
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with explicit attempt count and base delay.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Backoff delay after failed attempt `n` (0-indexed):
    /// `base_delay * 2^n`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Runs `op` until it succeeds, a permanent error occurs, or the policy's
/// attempt budget is exhausted. The last error is returned unchanged.
///
/// Classification lives in [`ChainPayError::is_transient`]: HTTP 429,
/// HTTP 5xx, and transport failures are retried; any other error shape
/// is rethrown immediately.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = ChainPayError::Other("retry invoked with zero attempts".to_string());

    for attempt in 0..policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient() || attempt + 1 == policy.max_attempts {
                    return Err(err);
                }
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off before retry"
                );
                last_err = err;
                sleep(delay).await;
            }
        }
    }

    Err(last_err)
}
