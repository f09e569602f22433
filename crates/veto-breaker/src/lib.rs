//! Circuit breaker and retry wrapper for remote calls made by network
//! validators and the background policy sync loop (specification §4.10).
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod breaker;
mod retry;

pub use breaker::{BreakerConfig, CircuitBreaker, State};
pub use retry::{backoff_delay, is_retriable_status, retry, RetryConfig, NON_RETRIABLE_STATUSES};

use std::future::Future;
use veto_core::error::{Classify, ErrorKind};

/// Error surfaced by [`call_guarded`]: either the breaker rejected the
/// call outright, or every retry attempt was exhausted.
#[derive(Debug, thiserror::Error)]
pub enum GuardedError<E> {
    /// The breaker is open; the call was never attempted.
    #[error("circuit breaker is open")]
    CircuitOpen,
    /// All retry attempts failed; carries the last underlying error.
    #[error("call failed after retries: {0}")]
    Exhausted(E),
}

impl<E> Classify for GuardedError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::CircuitOpen => ErrorKind::CircuitOpen,
            Self::Exhausted(_) => ErrorKind::NetworkPermanent,
        }
    }
}

/// Runs `f` through both the breaker and the retry policy: the breaker
/// gates admission, then `retry` runs the call with jittered exponential
/// backoff, feeding every outcome back into the breaker so its state
/// reflects reality. `should_retry` classifies the underlying error as
/// retriable or not (e.g. via [`is_retriable_status`]).
pub async fn call_guarded<F, Fut, T, E>(
    breaker: &CircuitBreaker,
    retry_config: &RetryConfig,
    should_retry: impl FnMut(&E) -> bool,
    mut f: F,
) -> Result<T, GuardedError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if !breaker.try_acquire() {
        return Err(GuardedError::CircuitOpen);
    }
    let result = retry(retry_config, should_retry, || f()).await;
    match result {
        Ok(v) => {
            breaker.on_success();
            Ok(v)
        }
        Err(e) => {
            breaker.on_failure();
            Err(GuardedError::Exhausted(e))
        }
    }
}
