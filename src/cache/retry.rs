//! Retry with exponential backoff around a single-shot rate source

use std::time::Duration;

use crate::data::{CurrencyCode, FetchedRates, RateError, RateSource};

/// Default number of fetch attempts before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default delay after the first failed attempt
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// How often and how patiently a fetch is retried
///
/// After failed attempt `k` (1-based) the fetch sleeps `base_delay * 2^(k-1)`
/// before trying again. There is no sleep after the final attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failure; doubled after each further failure
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
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Backoff to wait after failed attempt `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Fetches rates for `base`, retrying failures according to `policy`
///
/// Returns the first success, or the error from the last attempt once all
/// attempts are used up. A policy with zero attempts makes no request and
/// yields [`RateError::NoCachedData`].
pub async fn fetch_with_retry<S>(
    source: &S,
    base: &CurrencyCode,
    policy: RetryPolicy,
) -> Result<FetchedRates, RateError>
where
    S: RateSource + ?Sized,
{
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match source.fetch(base).await {
            Ok(fetched) => {
                if attempt > 1 {
                    tracing::info!(base = %base, attempt, "fetch succeeded after retry");
                }
                return Ok(fetched);
            }
            Err(err) => {
                if attempt < policy.max_attempts {
                    let delay = policy.delay_after(attempt);
                    tracing::warn!(
                        base = %base,
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %err,
                        "fetch failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                } else {
                    tracing::warn!(base = %base, attempt, error = %err, "fetch failed, giving up");
                }
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or(RateError::NoCachedData))
}
