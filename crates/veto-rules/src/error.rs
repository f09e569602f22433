//! Loader error type.

use thiserror::Error;
use veto_core::error::{Classify, ErrorKind};

/// A fatal problem found while loading or validating a rule document.
///
/// Mirrors the specification's `SchemaError{file, ruleId?, field, message}`
/// error kind, plus a dedicated variant for regex-screen rejections
/// (`RegexUnsafe`, also fatal at load time).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoaderError {
    /// The document failed to parse as YAML or JSON.
    #[error("{file}: malformed document: {message}")]
    Parse {
        /// Source file path (or a synthetic label for in-memory input).
        file: String,
        /// Underlying parser message.
        message: String,
    },
    /// A schema-level validation failure.
    #[error("{file}: field {field}: {message}")]
    Schema {
        /// Source file path.
        file: String,
        /// Offending rule id, if the error is rule-scoped.
        rule_id: Option<String>,
        /// Offending field name.
        field: String,
        /// Human-readable explanation.
        message: String,
    },
    /// A `matches` pattern failed the ReDoS safety screen.
    #[error("{file}: rule {rule_id}: unsafe regex pattern in field {field}: {source}")]
    RegexUnsafe {
        /// Source file path.
        file: String,
        /// Offending rule id.
        rule_id: String,
        /// Offending field name.
        field: String,
        /// The underlying screener rejection.
        source: veto_regex::UnsafePattern,
    },
    /// Could not read the rule file from disk.
    #[error("{file}: {message}")]
    Io {
        /// Source file path.
        file: String,
        /// Underlying I/O message.
        message: String,
    },
}

impl LoaderError {
    /// Construct a rule-scoped schema error.
    #[must_use]
    pub fn schema(file: impl Into<String>, rule_id: Option<String>, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema { file: file.into(), rule_id, field: field.into(), message: message.into() }
    }
}

impl Classify for LoaderError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::RegexUnsafe { .. } => ErrorKind::RegexUnsafe,
            Self::Parse { .. } | Self::Schema { .. } | Self::Io { .. } => ErrorKind::Schema,
        }
    }
}
