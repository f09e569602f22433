//! Thin CLI surface for the validation engine (specification §6):
//! `validate`, `test`, `simulate`, `diff`, `deploy`.

#![deny(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use veto_core::error::{Classify, ErrorKind};
use veto_core::value::Value as ArgValue;
use veto_rules::RuleSet;

#[derive(Parser, Debug)]
#[command(name = "veto", about = "Validate, test, simulate, diff, and deploy tool-call authorization policies")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and normalize a rule document without deciding anything.
    Validate {
        #[arg(long)]
        rules: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run a suite of test cases against a rule document.
    Test {
        #[arg(long)]
        rules: PathBuf,
        #[arg(long)]
        cases: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Decide a single tool call against a rule document.
    Simulate {
        #[arg(long)]
        rules: PathBuf,
        #[arg(long)]
        tool: String,
        /// Arguments as a JSON object, given inline or via `@path`.
        #[arg(long)]
        arguments: String,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Compare two rule sets by rule id: added, removed, changed.
    Diff {
        #[arg(long)]
        old: PathBuf,
        #[arg(long)]
        new: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Sign a rule document into a `SignedBundle` file.
    Deploy {
        #[arg(long)]
        rules: PathBuf,
        /// Base64-encoded Ed25519 signing key.
        #[arg(long)]
        key: String,
        #[arg(long = "key-id")]
        key_id: String,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

/// A single test case for the `test` subcommand.
#[derive(Debug, Deserialize)]
struct TestCase {
    #[serde(default)]
    name: Option<String>,
    tool_name: String,
    arguments: Value,
    expected: ExpectedDecision,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
enum ExpectedDecision {
    Allow,
    Deny,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.cmd {
        Command::Validate { rules, json } => cmd_validate(&rules, json),
        Command::Test { rules, cases, json } => cmd_test(&rules, &cases, json),
        Command::Simulate { rules, tool, arguments, json } => cmd_simulate(&rules, &tool, &arguments, json),
        Command::Diff { old, new, json } => cmd_diff(&old, &new, json),
        Command::Deploy { rules, key, key_id, out, json } => cmd_deploy(&rules, &key, &key_id, &out, json),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// A CLI-level error, classified the same way every library error is, so
/// the exit code always follows the specification's 0/1/2 contract.
#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Loader(#[from] veto_rules::LoaderError),
    #[error("{0}")]
    Compile(#[from] veto_bytecode::CompileError),
    #[error("{0}")]
    Vm(#[from] veto_bytecode::VmError),
    #[error("{0}")]
    Bundle(#[from] veto_bundle::VerifyError),
    #[error("{0}")]
    Crypto(#[from] veto_crypto::CryptoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("{0} test case(s) failed")]
    TestFailures(usize),
}

impl Classify for CliError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Loader(e) => e.kind(),
            Self::Compile(e) => e.kind(),
            Self::Vm(e) => e.kind(),
            Self::Bundle(e) => e.kind(),
            Self::Crypto(_) => ErrorKind::SignatureVerification,
            Self::Io(_) | Self::Json(_) | Self::Configuration(_) => ErrorKind::Configuration,
            Self::TestFailures(_) => ErrorKind::Schema,
        }
    }
}

impl CliError {
    fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

fn cmd_validate(rules: &Path, as_json: bool) -> Result<(), CliError> {
    let rule_set = veto_rules::load_rule_set_path(rules)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&json!({
            "valid": true,
            "ruleCount": rule_set.rules.len(),
        }))?);
    } else {
        println!("{} rules loaded from {}", rule_set.rules.len(), rules.display());
    }
    Ok(())
}

fn cmd_test(rules: &Path, cases: &Path, as_json: bool) -> Result<(), CliError> {
    let rule_set = veto_rules::load_rule_set_path(rules)?;
    let contents = fs::read_to_string(cases)?;
    let cases: Vec<TestCase> = serde_json::from_str(&contents)?;

    let mut results = Vec::with_capacity(cases.len());
    let mut failed = 0usize;
    for case in &cases {
        let applicable = rules_for_tool(&rule_set, &case.tool_name);
        let compiled = veto_bytecode::compile(&applicable)?;
        let args: ArgValue = case.arguments.clone().into();
        let outcome = veto_bytecode::evaluate(&compiled, &args)?;
        let actual = match outcome.decision {
            veto_bytecode::Decision::Allow => ExpectedDecision::Allow,
            veto_bytecode::Decision::Deny => ExpectedDecision::Deny,
        };
        let passed = actual == case.expected;
        if !passed {
            failed += 1;
        }
        results.push(json!({
            "name": case.name,
            "toolName": case.tool_name,
            "expected": case.expected,
            "actual": actual,
            "passed": passed,
            "reason": outcome.reason,
        }));
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&json!({
            "total": cases.len(),
            "failed": failed,
            "results": results,
        }))?);
    } else {
        for (case, result) in cases.iter().zip(&results) {
            let mark = if result["passed"].as_bool().unwrap_or(false) { "ok" } else { "FAIL" };
            println!("[{mark}] {}", case.name.clone().unwrap_or_else(|| case.tool_name.clone()));
        }
        println!("{}/{} passed", cases.len() - failed, cases.len());
    }

    if failed > 0 {
        return Err(CliError::TestFailures(failed));
    }
    Ok(())
}

/// Rules that apply to `tool`: enabled, and either untargeted (applies to
/// every tool) or explicitly naming `tool`.
fn rules_for_tool(rule_set: &RuleSet, tool: &str) -> Vec<veto_rules::Rule> {
    rule_set
        .rules
        .iter()
        .filter(|r| r.enabled && (r.tools.is_empty() || r.tools.iter().any(|t| t == tool)))
        .cloned()
        .collect()
}

fn cmd_simulate(rules: &Path, tool: &str, arguments: &str, as_json: bool) -> Result<(), CliError> {
    let rule_set = veto_rules::load_rule_set_path(rules)?;
    let applicable = rules_for_tool(&rule_set, tool);
    let compiled = veto_bytecode::compile(&applicable)?;

    let raw = read_arguments(arguments)?;
    let args: ArgValue = raw.into();
    let outcome = veto_bytecode::evaluate(&compiled, &args)?;

    let allowed = matches!(outcome.decision, veto_bytecode::Decision::Allow);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&json!({
            "allowed": allowed,
            "validationResult": {
                "decision": if allowed { "allow" } else { "deny" },
                "reason": outcome.reason,
                "metadata": { "ruleId": outcome.rule_id, "matchedRuleIds": outcome.matched_rule_ids },
            },
        }))?);
    } else {
        println!("{}", if allowed { "allow" } else { "deny" });
        if let Some(reason) = &outcome.reason {
            println!("reason: {reason}");
        }
    }
    Ok(())
}

/// Reads an inline JSON argument map, or `@path` to read it from a file.
fn read_arguments(arguments: &str) -> Result<Value, CliError> {
    let raw = match arguments.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)?,
        None => arguments.to_string(),
    };
    Ok(serde_json::from_str(&raw)?)
}

fn cmd_diff(old: &Path, new: &Path, as_json: bool) -> Result<(), CliError> {
    let old_set = veto_rules::load_rule_set_path(old)?;
    let new_set = veto_rules::load_rule_set_path(new)?;

    let old_by_id: BTreeMap<_, _> = old_set.rules.iter().map(|r| (r.id.clone(), r)).collect();
    let new_by_id: BTreeMap<_, _> = new_set.rules.iter().map(|r| (r.id.clone(), r)).collect();

    let added: Vec<&str> = new_by_id.keys().filter(|id| !old_by_id.contains_key(*id)).map(String::as_str).collect();
    let removed: Vec<&str> = old_by_id.keys().filter(|id| !new_by_id.contains_key(*id)).map(String::as_str).collect();
    let changed: Vec<&str> = new_by_id
        .iter()
        .filter_map(|(id, rule)| old_by_id.get(id).filter(|old_rule| old_rule != rule).map(|_| id.as_str()))
        .collect();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&json!({
            "added": added,
            "removed": removed,
            "changed": changed,
        }))?);
    } else {
        println!("added: {}", added.join(", "));
        println!("removed: {}", removed.join(", "));
        println!("changed: {}", changed.join(", "));
    }
    Ok(())
}

fn cmd_deploy(rules: &Path, key_b64: &str, key_id: &str, out: &Path, as_json: bool) -> Result<(), CliError> {
    let rule_set: RuleSet = veto_rules::load_rule_set_path(rules)?;
    let signing_key = veto_crypto::signing_key_from_base64(key_b64)?;
    let bundle = veto_bundle::create_signed_bundle(&rule_set, &signing_key, key_id);

    let serialized = serde_json::to_string_pretty(&bundle)?;
    fs::write(out, &serialized)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&json!({
            "written": out.display().to_string(),
            "version": bundle.version,
            "publicKeyId": bundle.public_key_id,
        }))?);
    } else {
        println!("wrote signed bundle to {}", out.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const RULES_YAML: &str = r#"
version: "1"
name: demo
rules:
  - id: block-etc
    name: Block /etc reads
    severity: high
    action: block
    tools: [read_file]
    conditions:
      - field: arguments.path
        operator: starts_with
        value: "/etc"
"#;

    fn write_rules(dir: &Path) -> PathBuf {
        let path = dir.join("rules.yaml");
        fs::write(&path, RULES_YAML).unwrap();
        path
    }

    #[test]
    fn validate_loads_and_normalizes() {
        let dir = tempdir().unwrap();
        let rules = write_rules(dir.path());
        cmd_validate(&rules, false).unwrap();
    }

    #[test]
    fn simulate_denies_etc_path() {
        let dir = tempdir().unwrap();
        let rules = write_rules(dir.path());
        cmd_simulate(&rules, "read_file", r#"{"path":"/etc/passwd"}"#, false).unwrap();
    }

    #[test]
    fn test_subcommand_reports_failures() {
        let dir = tempdir().unwrap();
        let rules = write_rules(dir.path());
        let cases = dir.path().join("cases.json");
        fs::write(
            &cases,
            r#"[
                {"tool_name":"read_file","arguments":{"path":"/etc/passwd"},"expected":"allow"},
                {"tool_name":"read_file","arguments":{"path":"/home/user"},"expected":"allow"}
            ]"#,
        )
        .unwrap();
        let err = cmd_test(&rules, &cases, false).unwrap_err();
        assert!(matches!(err, CliError::TestFailures(1)));
    }

    #[test]
    fn diff_reports_added_and_removed() {
        let dir = tempdir().unwrap();
        let old = write_rules(dir.path());
        let new_path = dir.path().join("new.yaml");
        fs::write(
            &new_path,
            r#"
version: "1"
name: demo
rules:
  - id: block-tmp
    name: Block /tmp reads
    severity: medium
    action: block
    conditions:
      - field: arguments.path
        operator: starts_with
        value: "/tmp"
"#,
        )
        .unwrap();
        cmd_diff(&old, &new_path, false).unwrap();
    }

    #[test]
    fn deploy_writes_a_verifiable_bundle() {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine as _;
        use ed25519_dalek::SigningKey;
        use rand::rngs::OsRng;

        let dir = tempdir().unwrap();
        let rules = write_rules(dir.path());
        let out = dir.path().join("bundle.json");

        let signing_key = SigningKey::generate(&mut OsRng);
        let key_b64 = BASE64.encode(signing_key.to_bytes());

        cmd_deploy(&rules, &key_b64, "key-1", &out, false).unwrap();
        let contents = fs::read_to_string(&out).unwrap();
        let bundle: veto_bundle::SignedBundle = serde_json::from_str(&contents).unwrap();
        assert_eq!(bundle.public_key_id, "key-1");
    }
}
