//! Bounded exponential backoff for transport calls.

use crate::provider::error::{ProviderError, ProviderResult};
use std::future::Future;
use std::time::Duration;

/// Retry settings: `max_retries` extra attempts after the first, sleeping
/// `base_delay * 2^attempt` between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Sleep before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }

    /// Run `operation` until it succeeds, fails permanently or the retries run out.
    ///
    /// Non-retryable errors (token limit, 4xx, decode) are returned unchanged.
    /// Exhaustion is reported as [`ProviderError::RetriesExhausted`].
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt >= self.max_retries => {
                    tracing::error!(
                        "{} failed after {} attempts: {}",
                        label,
                        attempt + 1,
                        err
                    );
                    return Err(ProviderError::RetriesExhausted {
                        attempts: attempt + 1,
                        last_error: err.to_string(),
                    });
                }
                Err(err) => {
                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        "{} attempt {} failed: {}. Retrying in {:?}",
                        label,
                        attempt + 1,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}
