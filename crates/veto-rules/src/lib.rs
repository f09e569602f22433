//! Rule schema and loader (component C3).
//!
//! Parses a rule document (YAML or JSON), validates types and enums,
//! screens `matches` regex values for catastrophic backtracking, checks
//! rule-id uniqueness, and produces a deterministically normalized
//! [`RuleSet`]. See specification §3 (data model) and §4.3 (loader).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod loader;
mod model;
mod normalize;

pub use error::LoaderError;
pub use loader::{load_rule_set_path, load_rule_set_str, Encoding};
pub use model::{Action, Condition, Operator, Rule, RuleSet, Severity};
pub use normalize::normalize;
