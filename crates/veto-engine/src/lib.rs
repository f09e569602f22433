//! The validation engine (specification §4.11): an ordered list of named,
//! prioritized, optionally tool-scoped validators, run sequentially with
//! short-circuit semantics and aggregated into one decision. Composes the
//! rule loader, bytecode compiler and VM, deterministic constraint
//! validator, policy cache, and background sync behind a small trait.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decision;
mod engine;
mod validator;
pub mod validators;

pub use decision::{Decision, DecisionKind};
pub use engine::{EngineObserver, EngineResult, NoopObserver, ValidationEngine, ValidatorResult};
pub use validator::{ValidationContext, Validator};
