//! Deterministic per-argument constraint validator (specification §4.7),
//! independent of the bytecode compiler and VM.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod model;
mod validator;

pub use model::ArgumentConstraint;
pub use validator::{validate, ConstraintReport, Decision, ValidationOutcome};
