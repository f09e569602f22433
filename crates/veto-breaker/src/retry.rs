//! Exponential-backoff retry (specification §4.10).

use rand::Rng;
use std::time::Duration;

/// HTTP statuses that should never be retried.
pub const NON_RETRIABLE_STATUSES: [u16; 5] = [400, 401, 403, 404, 422];

/// Whether `status` is worth retrying. `429` (rate limited) is
/// retriable; the statuses in [`NON_RETRIABLE_STATUSES`] are not; any
/// other status (including 5xx) is treated as retriable.
#[must_use]
pub fn is_retriable_status(status: u16) -> bool {
    !NON_RETRIABLE_STATUSES.contains(&status)
}

/// Tunables for [`backoff_delay`] / [`retry`].
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Base delay for attempt 0.
    pub base_delay: Duration,
    /// Upper bound on any single delay, after jitter.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Computes `base * 2^attempt`, capped at `max_delay`, then jitters the
/// result uniformly into `[50%, 100%]` of that cap.
#[must_use]
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = config.base_delay.as_millis().saturating_mul(1u128 << attempt.min(32));
    let capped_ms = exp.min(config.max_delay.as_millis()) as u64;
    let jittered_ms = rand::thread_rng().gen_range(capped_ms / 2..=capped_ms.max(1));
    Duration::from_millis(jittered_ms)
}

/// Retries an async operation up to `config.max_attempts` times, sleeping
/// with jittered exponential backoff between attempts. `should_retry`
/// decides, given the error, whether another attempt is worthwhile; a
/// `false` verdict returns the error immediately without sleeping.
pub async fn retry<F, Fut, T, E>(config: &RetryConfig, mut should_retry: impl FnMut(&E) -> bool, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempt += 1;
                if attempt >= config.max_attempts || !should_retry(&e) {
                    return Err(e);
                }
                tokio::time::sleep(backoff_delay(config, attempt - 1)).await;
            }
        }
    }
}
