//! Deterministic normalization of a loaded [`RuleSet`] (specification §3).
//!
//! Normalization is idempotent: `normalize(normalize(r)) == normalize(r)`
//! for any `r`, which is exercised directly in the tests below and again,
//! end to end, in `veto-bundle`'s canonical round-trip property.

use crate::model::{Condition, Rule, RuleSet, Severity};
use serde_json::Value as JsonValue;

/// Normalize a rule set in place: sort rules by severity (descending) then
/// id, sort each rule's conditions by field path, lowercase and sort tool
/// names, and trim string values.
pub fn normalize(mut rule_set: RuleSet) -> RuleSet {
    rule_set.name = rule_set.name.trim().to_string();
    if let Some(desc) = &rule_set.description {
        let trimmed = desc.trim().to_string();
        rule_set.description = Some(trimmed);
    }
    for rule in &mut rule_set.rules {
        normalize_rule(rule);
    }
    rule_set.rules.sort_by(|a, b| severity_rank(b.severity).cmp(&severity_rank(a.severity)).then_with(|| a.id.cmp(&b.id)));
    rule_set
}

fn severity_rank(s: Severity) -> u8 {
    match s {
        Severity::Critical => 4,
        Severity::High => 3,
        Severity::Medium => 2,
        Severity::Low => 1,
        Severity::Info => 0,
    }
}

fn normalize_rule(rule: &mut Rule) {
    rule.name = rule.name.trim().to_string();
    if let Some(desc) = &rule.description {
        rule.description = Some(desc.trim().to_string());
    }
    rule.tools = {
        let mut tools: Vec<String> =
            rule.tools.iter().map(|t| t.trim().to_lowercase()).collect();
        tools.sort();
        tools.dedup();
        tools
    };
    sort_conditions(&mut rule.conditions);
    for group in &mut rule.condition_groups {
        sort_conditions(group);
    }
    rule.condition_groups.sort_by(|a, b| group_sort_key(a).cmp(&group_sort_key(b)));
}

fn sort_conditions(conditions: &mut [Condition]) {
    for c in conditions.iter_mut() {
        trim_condition(c);
    }
    conditions.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));
}

fn group_sort_key(group: &[Condition]) -> String {
    group.iter().map(Condition::sort_key).collect::<Vec<_>>().join("\u{0}")
}

fn trim_condition(condition: &mut Condition) {
    match condition {
        Condition::Triple { field, value, .. } => {
            *field = field.trim().to_string();
            trim_json_strings(value);
        }
        Condition::Expression { expression } => {
            *expression = expression.trim().to_string();
        }
    }
}

fn trim_json_strings(value: &mut JsonValue) {
    match value {
        JsonValue::String(s) => *s = s.trim().to_string(),
        JsonValue::Array(items) => items.iter_mut().for_each(trim_json_strings),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Operator};

    fn sample() -> RuleSet {
        RuleSet {
            version: "1".into(),
            name: "  demo  ".into(),
            description: None,
            rules: vec![
                Rule {
                    id: "b-rule".into(),
                    name: " B ".into(),
                    description: None,
                    enabled: true,
                    severity: Severity::Low,
                    action: Action::Block,
                    tools: vec!["Read".into(), "write".into()],
                    conditions: vec![Condition::Triple {
                        field: " arguments.path ".into(),
                        operator: Operator::StartsWith,
                        value: JsonValue::String(" /etc ".into()),
                    }],
                    condition_groups: vec![],
                },
                Rule {
                    id: "a-rule".into(),
                    name: "A".into(),
                    description: None,
                    enabled: true,
                    severity: Severity::Critical,
                    action: Action::Block,
                    tools: vec![],
                    conditions: vec![Condition::Triple {
                        field: "arguments.z".into(),
                        operator: Operator::Equals,
                        value: JsonValue::Null,
                    }, Condition::Triple {
                        field: "arguments.a".into(),
                        operator: Operator::Equals,
                        value: JsonValue::Null,
                    }],
                    condition_groups: vec![],
                },
            ],
        }
    }

    #[test]
    fn sorts_by_severity_then_id() {
        let normalized = normalize(sample());
        assert_eq!(normalized.rules[0].id, "a-rule");
        assert_eq!(normalized.rules[1].id, "b-rule");
    }

    #[test]
    fn lowercases_and_sorts_tools() {
        let normalized = normalize(sample());
        assert_eq!(normalized.rules[1].tools, vec!["read", "write"]);
    }

    #[test]
    fn sorts_conditions_by_field_path() {
        let normalized = normalize(sample());
        let fields: Vec<&str> =
            normalized.rules[0].conditions.iter().map(Condition::sort_key).collect();
        assert_eq!(fields, vec!["arguments.a", "arguments.z"]);
    }

    #[test]
    fn trims_strings() {
        let normalized = normalize(sample());
        assert_eq!(normalized.name, "demo");
        assert_eq!(normalized.rules[1].name, "B");
        if let Condition::Triple { field, value, .. } = &normalized.rules[1].conditions[0] {
            assert_eq!(field, "arguments.path");
            assert_eq!(value, &JsonValue::String("/etc".into()));
        } else {
            panic!("expected triple condition");
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize(sample());
        let twice = normalize(once.clone());
        assert_eq!(once, twice);
    }
}
