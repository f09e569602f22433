//! Built-in validators composing the lower-level components into the
//! engine's `Validator` interface.

mod constraint;
mod policy;

pub use constraint::{ConstraintSource, ConstraintValidator, StaticConstraintSource};
pub use policy::{PolicyValidator, RuleSource};
