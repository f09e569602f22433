//! Three-state circuit breaker (specification §4.10).

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Observable state of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Calls are admitted normally.
    Closed,
    /// Calls are rejected outright.
    Open,
    /// A limited number of probe calls are admitted to test recovery.
    HalfOpen,
}

/// Tunables for a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures while closed before tripping to open.
    pub failure_threshold: u32,
    /// How long to stay open before allowing a half-open probe.
    pub reset_timeout: Duration,
    /// Concurrent probes admitted while half-open.
    pub half_open_max_attempts: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_max_attempts: 1,
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: State,
    failure_count: u32,
    last_failure: Option<Instant>,
    half_open_in_flight: u32,
}

/// A per-endpoint circuit breaker. Cheap to clone via `Arc` at the call
/// site; internally synchronized so callers can share one instance
/// across concurrent validators.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// A new breaker, starting closed.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                failure_count: 0,
                last_failure: None,
                half_open_in_flight: 0,
            }),
        }
    }

    /// The current state, lazily transitioning `open → half-open` once
    /// `resetTimeoutMs` has elapsed since the last recorded failure.
    #[must_use]
    pub fn state(&self) -> State {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        if inner.state == State::Open {
            if let Some(last_failure) = inner.last_failure {
                if last_failure.elapsed() >= self.config.reset_timeout {
                    inner.state = State::HalfOpen;
                    inner.half_open_in_flight = 0;
                }
            }
        }
        inner.state
    }

    /// Whether a new call should be admitted right now. In `HalfOpen`,
    /// admits at most `halfOpenMaxAttempts` concurrent probes; the caller
    /// must report the outcome via [`Self::on_success`] / [`Self::on_failure`].
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        match self.state() {
            State::Closed => true,
            State::Open => false,
            State::HalfOpen => {
                let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
                if inner.half_open_in_flight < self.config.half_open_max_attempts {
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful call. Any success in `HalfOpen` closes the
    /// breaker and resets the failure count.
    pub fn on_success(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            State::HalfOpen => {
                inner.state = State::Closed;
                inner.failure_count = 0;
                inner.last_failure = None;
                inner.half_open_in_flight = 0;
            }
            State::Closed => {
                inner.failure_count = 0;
            }
            State::Open => {}
        }
    }

    /// Records a failed call. `failureThreshold` consecutive failures
    /// while closed trips to open; any failure while half-open reopens.
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.last_failure = Some(Instant::now());
        match inner.state {
            State::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = State::Open;
                }
            }
            State::HalfOpen => {
                inner.state = State::Open;
                inner.half_open_in_flight = 0;
            }
            State::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, reset: Duration) -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: threshold,
            reset_timeout: reset,
            half_open_max_attempts: 1,
        })
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let b = breaker(3, Duration::from_secs(60));
        assert_eq!(b.state(), State::Closed);
        b.on_failure();
        b.on_failure();
        assert_eq!(b.state(), State::Closed);
        b.on_failure();
        assert_eq!(b.state(), State::Open);
        assert!(!b.try_acquire());
    }

    #[test]
    fn success_resets_failure_count_while_closed() {
        let b = breaker(3, Duration::from_secs(60));
        b.on_failure();
        b.on_failure();
        b.on_success();
        b.on_failure();
        b.on_failure();
        assert_eq!(b.state(), State::Closed);
    }

    #[test]
    fn half_open_admits_limited_probes() {
        let b = breaker(1, Duration::from_millis(0));
        b.on_failure();
        assert_eq!(b.state(), State::HalfOpen);
        assert!(b.try_acquire());
        assert!(!b.try_acquire());
    }

    #[test]
    fn half_open_success_closes_breaker() {
        let b = breaker(1, Duration::from_millis(0));
        b.on_failure();
        assert_eq!(b.state(), State::HalfOpen);
        b.try_acquire();
        b.on_success();
        assert_eq!(b.state(), State::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let b = breaker(1, Duration::from_millis(0));
        b.on_failure();
        assert_eq!(b.state(), State::HalfOpen);
        b.try_acquire();
        b.on_failure();
        assert_eq!(b.state(), State::Open);
    }
}
