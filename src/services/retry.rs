use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, AppResult};

// 2^10 caps a single wait at ~17 minutes for a 1s base
const MAX_BACKOFF_SHIFT: u32 = 10;

/// Bounded exponential backoff for rate-limited upstream calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wait before the retry that follows `attempt` (0-based): base, 2x, 4x, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.min(MAX_BACKOFF_SHIFT))
    }
}

/// Runs `call`, retrying only `UpstreamRateLimited` failures
///
/// Any other error is returned immediately. When every attempt is throttled
/// the last `UpstreamRateLimited` error is returned so the caller can decide
/// whether to degrade or abort.
pub async fn retry_rate_limited<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut call: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0;

    loop {
        match call().await {
            Err(e) if e.is_rate_limited() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_rate_limited() => {
                tracing::warn!(
                    operation = %operation,
                    attempts = policy.max_attempts,
                    "Rate limited on every attempt, giving up"
                );
                return Err(AppError::UpstreamRateLimited(format!(
                    "{} still rate limited after {} attempts",
                    operation, policy.max_attempts
                )));
            }
            other => return other,
        }
    }
}
