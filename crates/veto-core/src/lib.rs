//! Shared primitives for the veto policy decision pipeline: the dynamic
//! argument value model, argument-path resolution, id/time utilities, and
//! error scaffolding reused by every other `veto-*` crate.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ids {
    //! Monotonic ids and wall-clock helpers used for decision/audit records.

    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    use uuid::Uuid;

    static NEXT_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate a new monotonic identifier (starts at 1).
    pub fn next_monotonic_id() -> u64 {
        NEXT_ID.fetch_add(1, Ordering::Relaxed)
    }

    /// Milliseconds since the UNIX epoch.
    pub fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as u64
    }

    /// Nanoseconds on a monotonic clock, for VM/latency reporting.
    ///
    /// Backed by [`std::time::Instant`] relative to process start so that
    /// evaluation latency never depends on wall-clock adjustments.
    pub fn monotonic_ns() -> u128 {
        use std::sync::OnceLock;
        use std::time::Instant;
        static START: OnceLock<Instant> = OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos()
    }

    /// Opaque trace identifier (UUID v4 string).
    pub fn new_trace_id() -> String {
        Uuid::new_v4().to_string()
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn monotonic_increments() {
            let a = next_monotonic_id();
            let b = next_monotonic_id();
            assert!(b > a);
        }

        #[test]
        fn trace_id_format() {
            let t = new_trace_id();
            assert_eq!(t.len(), 36);
            assert!(t.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
        }
    }
}

pub mod value;

pub mod error {
    //! Shared error-kind scaffolding.
    //!
    //! Every `veto-*` crate defines its own `thiserror`-derived error enum
    //! (per the error kinds named in the specification), but each one
    //! exposes a [`ErrorKind`] so a caller (chiefly `veto-cli`) can map any
    //! error, from any crate, onto an exit code without matching on crate-
    //! specific variants.

    /// Coarse classification of an error, independent of which crate raised
    /// it. Mirrors the "Error kinds (not types)" in the specification.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum ErrorKind {
        /// Malformed or invalid rule/constraint document.
        Schema,
        /// A regex value failed the ReDoS safety screen.
        RegexUnsafe,
        /// An inline expression failed to parse.
        ExpressionParse,
        /// A type-check issue severe enough to fail the rule.
        TypeCheck,
        /// The stack VM exceeded a bound (stack depth or instruction count).
        VmLimit,
        /// A transient network failure (retriable).
        NetworkTransient,
        /// A permanent network failure (non-retriable).
        NetworkPermanent,
        /// The circuit breaker is open.
        CircuitOpen,
        /// Ed25519 signature verification failed.
        SignatureVerification,
        /// A signed bundle was malformed.
        BundleFormat,
        /// A signed bundle failed a pinning check.
        BundlePin,
        /// An approval request timed out.
        ApprovalTimeout,
        /// Caller or environment misconfiguration.
        Configuration,
    }

    impl ErrorKind {
        /// Exit code `veto-cli` uses when this is the terminal error kind.
        ///
        /// `0` is reserved for success and is never returned here:
        /// `1` for validation/decision errors, `2` for configuration errors.
        #[must_use]
        pub const fn exit_code(self) -> i32 {
            match self {
                Self::Configuration => 2,
                _ => 1,
            }
        }
    }

    /// Implemented by every crate's concrete error enum so callers can
    /// classify an error without depending on crate-specific variants.
    pub trait Classify {
        /// Returns the coarse [`ErrorKind`] for this error.
        fn kind(&self) -> ErrorKind;
    }
}
