//! Explanation entries and verbosity-gated trails (specification §4.12).

use serde::{Deserialize, Serialize};

/// How much detail a decision's trail records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// No trace at all.
    None,
    /// Matched-rule summaries only.
    Simple,
    /// Every constraint evaluation, pass or fail.
    Verbose,
}

/// Pass/fail outcome of one recorded check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckResult {
    /// The check passed.
    Pass,
    /// The check failed.
    Fail,
}

/// One entry in a decision's explanation trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationEntry {
    /// The rule that produced this entry, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// The rule's human-readable name, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
    /// The constraint or condition being checked (e.g. `"maximum"`,
    /// `"matches"`).
    pub constraint: String,
    /// The argument path examined, after redaction.
    pub path: String,
    /// The expected value or bound, as a display string.
    pub expected: String,
    /// The actual value observed, as a display string.
    pub actual: String,
    /// Pass or fail.
    pub result: CheckResult,
    /// Human-readable detail.
    pub message: String,
}

/// An ordered collection of entries for one decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplanationTrail {
    /// Entries in evaluation order.
    pub entries: Vec<ExplanationEntry>,
}

impl ExplanationTrail {
    /// An empty trail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `entry` unless `verbosity` is [`Verbosity::None`], and
    /// drops passing entries when `verbosity` is [`Verbosity::Simple`]
    /// (which records matched-rule summaries, not every check).
    pub fn record(&mut self, verbosity: Verbosity, entry: ExplanationEntry) {
        match verbosity {
            Verbosity::None => {}
            Verbosity::Simple => {
                if entry.result == CheckResult::Fail || entry.rule_id.is_some() {
                    self.entries.push(entry);
                }
            }
            Verbosity::Verbose => self.entries.push(entry),
        }
    }
}

/// Replaces `path` with the literal `[REDACTED]` if it equals, or is
/// nested beneath (dotted-prefix), any entry in `redact_paths`.
#[must_use]
pub fn redact_path(path: &str, redact_paths: &[String]) -> String {
    let is_redacted = redact_paths.iter().any(|prefix| {
        path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
    });
    if is_redacted {
        "[REDACTED]".to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, result: CheckResult) -> ExplanationEntry {
        ExplanationEntry {
            rule_id: None,
            rule_name: None,
            constraint: "maximum".to_string(),
            path: path.to_string(),
            expected: "<= 100".to_string(),
            actual: "500".to_string(),
            result,
            message: "value exceeds the maximum".to_string(),
        }
    }

    #[test]
    fn none_verbosity_records_nothing() {
        let mut trail = ExplanationTrail::new();
        trail.record(Verbosity::None, entry("arguments.amount", CheckResult::Fail));
        assert!(trail.entries.is_empty());
    }

    #[test]
    fn simple_verbosity_drops_passing_non_rule_entries() {
        let mut trail = ExplanationTrail::new();
        trail.record(Verbosity::Simple, entry("arguments.amount", CheckResult::Pass));
        trail.record(Verbosity::Simple, entry("arguments.amount", CheckResult::Fail));
        assert_eq!(trail.entries.len(), 1);
        assert_eq!(trail.entries[0].result, CheckResult::Fail);
    }

    #[test]
    fn verbose_verbosity_records_everything() {
        let mut trail = ExplanationTrail::new();
        trail.record(Verbosity::Verbose, entry("arguments.amount", CheckResult::Pass));
        trail.record(Verbosity::Verbose, entry("arguments.amount", CheckResult::Fail));
        assert_eq!(trail.entries.len(), 2);
    }

    #[test]
    fn redacts_exact_and_nested_paths() {
        let redact = vec!["arguments.secret".to_string()];
        assert_eq!(redact_path("arguments.secret", &redact), "[REDACTED]");
        assert_eq!(redact_path("arguments.secret.token", &redact), "[REDACTED]");
        assert_eq!(redact_path("arguments.secret_other", &redact), "arguments.secret_other");
        assert_eq!(redact_path("arguments.amount", &redact), "arguments.amount");
    }
}
