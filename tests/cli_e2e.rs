mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use common::{policy_with, write_class, write_policy, ClassFileBuilder};

fn cmd() -> Command {
    Command::cargo_bin("shamash").unwrap()
}

const CLEAN_POLICY: &str = "version: 1\nproject:\n  bytecodeRoots: [\"out\"]\n";

fn findings_policy() -> String {
    policy_with(
        r#"rules:
  - id: naming.bannedSuffixes
    severity: error
    params:
      banned: [Manager]
"#,
    )
}

#[test]
fn test_cli_help() {
    cmd().arg("scan").arg("--help").assert().success();
}

#[test]
fn test_cli_exit_0_clean_project() {
    let tmp = TempDir::new().unwrap();
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/Fine"));
    write_policy(tmp.path(), CLEAN_POLICY);
    cmd().arg("scan").arg(tmp.path()).assert().success();
}

#[test]
fn test_cli_exit_1_on_gated_findings() {
    let tmp = TempDir::new().unwrap();
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/UserManager"));
    write_policy(tmp.path(), &findings_policy());
    cmd().arg("scan").arg(tmp.path()).assert().code(1);
}

#[test]
fn test_cli_gate_severity() {
    let tmp = TempDir::new().unwrap();
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/UserManager"));
    write_policy(
        tmp.path(),
        &policy_with(
            r#"rules:
  - id: naming.bannedSuffixes
    severity: warning
    params:
      banned: [Manager]
"#,
        ),
    );
    // Warning findings pass the default (error) gate but fail a warning gate.
    cmd().arg("scan").arg(tmp.path()).assert().success();
    cmd()
        .arg("scan")
        .arg(tmp.path())
        .arg("--fail-on")
        .arg("warning")
        .assert()
        .code(1);
}

#[test]
fn test_cli_exit_2_bad_path() {
    cmd().arg("scan").arg("/nonexistent/path/xyz").assert().code(2);
}

#[test]
fn test_cli_exit_2_missing_policy() {
    let tmp = TempDir::new().unwrap();
    cmd().arg("scan").arg(tmp.path()).assert().code(2);
}

#[test]
fn test_cli_exit_2_invalid_policy() {
    let tmp = TempDir::new().unwrap();
    write_policy(tmp.path(), "version: 2\nproject:\n  bytecodeRoots: [\"out\"]\n");
    cmd().arg("scan").arg(tmp.path()).assert().code(2);
}

#[test]
fn test_cli_json_output() {
    let tmp = TempDir::new().unwrap();
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/UserManager"));
    write_policy(tmp.path(), &findings_policy());
    let output = cmd()
        .arg("scan")
        .arg(tmp.path())
        .arg("--json")
        .output()
        .unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["findings"].as_array().unwrap().len(), 1);
    assert_eq!(value["success"], true);
}

#[test]
fn test_cli_validate_ok() {
    let tmp = TempDir::new().unwrap();
    write_policy(tmp.path(), CLEAN_POLICY);
    cmd()
        .arg("validate")
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Policy OK"));
}

#[test]
fn test_cli_validate_reports_errors() {
    let tmp = TempDir::new().unwrap();
    write_policy(
        tmp.path(),
        "version: 1\nproject:\n  bytecodeRoots: [\"out\"]\nrules:\n  - id: no.suchRule\n",
    );
    cmd()
        .arg("validate")
        .arg(tmp.path())
        .assert()
        .code(2)
        .stdout(predicate::str::contains("no.suchRule"));
}

#[test]
fn test_cli_explicit_policy_path() {
    let tmp = TempDir::new().unwrap();
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/Fine"));
    std::fs::write(tmp.path().join("custom-policy.yml"), CLEAN_POLICY).unwrap();
    cmd()
        .arg("scan")
        .arg(tmp.path())
        .arg("--policy")
        .arg(tmp.path().join("custom-policy.yml"))
        .assert()
        .success();
}

#[test]
fn test_cli_bad_fail_on_value() {
    let tmp = TempDir::new().unwrap();
    write_policy(tmp.path(), CLEAN_POLICY);
    cmd()
        .arg("scan")
        .arg(tmp.path())
        .arg("--fail-on")
        .arg("catastrophic")
        .assert()
        .code(2);
}
