mod common;

use std::fs;
use std::path::Path;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use common::{policy_with, write_class, write_policy, ClassFileBuilder};
use shamash::{run_with_config, CancelToken, EngineConfig};

const ACC_PRIVATE: u16 = 0x0002;

fn fixture(root: &Path) {
    write_class(
        root,
        ClassFileBuilder::new("com/pit/AdminController")
            .field(ACC_PRIVATE, "repo", "Lcom/pit/UserRepository;"),
    );
    write_class(root, ClassFileBuilder::new("com/pit/UserRepository"));
    write_class(root, ClassFileBuilder::new("com/pit/LoneManager"));
    write_policy(
        root,
        &policy_with(
            r#"roles:
  - id: controller
    match:
      classNameEndsWith: Controller
  - id: repository
    match:
      classNameEndsWith: Repository
analysis:
  enabled: true
rules:
  - id: arch.forbiddenRoleDependencies
    severity: error
    params:
      forbidden:
        - from: controller
          to: [repository]
  - id: naming.bannedSuffixes
    severity: warning
    params:
      banned: [Manager]
export:
  formats: [JSON, SARIF, XML, HTML]
  sidecars: [FACTS, ROLES, RULE_PLAN, ANALYSIS_GRAPHS, ANALYSIS_HOTSPOTS, ANALYSIS_SCORES]
"#,
        ),
    );
}

fn fixed_config(root: &Path) -> EngineConfig {
    let mut config = EngineConfig::new(root);
    config.generated_at = Some(Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap());
    config
}

fn run_fixture(root: &Path) {
    run_with_config(&fixed_config(root), &CancelToken::new()).unwrap();
}

#[test]
fn test_full_bundle_written() {
    let tmp = TempDir::new().unwrap();
    fixture(tmp.path());
    run_fixture(tmp.path());
    let out = tmp.path().join(".shamash");
    for name in [
        "shamash-report.json",
        "shamash-report.sarif.json",
        "shamash-report.xml",
        "shamash-report.html",
        "facts.json",
        "roles.json",
        "rule-plan.json",
        "analysis-graphs.json",
        "analysis-hotspots.json",
        "analysis-scores.json",
    ] {
        assert!(out.join(name).exists(), "missing {}", name);
    }
}

#[test]
fn test_reruns_are_byte_identical() {
    let tmp = TempDir::new().unwrap();
    fixture(tmp.path());
    run_fixture(tmp.path());
    let out = tmp.path().join(".shamash");
    let names = [
        "shamash-report.json",
        "shamash-report.sarif.json",
        "shamash-report.xml",
        "shamash-report.html",
        "facts.json",
        "roles.json",
        "rule-plan.json",
        "analysis-graphs.json",
    ];
    let first: Vec<Vec<u8>> = names.iter().map(|n| fs::read(out.join(n)).unwrap()).collect();
    run_fixture(tmp.path());
    let second: Vec<Vec<u8>> = names.iter().map(|n| fs::read(out.join(n)).unwrap()).collect();
    assert_eq!(first, second);
}

#[test]
fn test_json_report_shape() {
    let tmp = TempDir::new().unwrap();
    fixture(tmp.path());
    run_fixture(tmp.path());
    let report: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(tmp.path().join(".shamash/shamash-report.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["version"], 1);
    assert_eq!(report["tool"], "shamash");
    assert_eq!(report["generatedAt"], "2026-01-15T12:00:00Z");
    let findings = report["findings"].as_array().unwrap();
    assert_eq!(findings.len(), 2);
    // Sorted by file path: AdminController before LoneManager.
    assert_eq!(findings[0]["ruleId"], "arch.forbiddenRoleDependencies");
    assert_eq!(findings[0]["filePath"], "out/com/pit/AdminController.class");
    assert_eq!(findings[0]["fingerprint"].as_str().unwrap().len(), 64);
    assert_eq!(findings[1]["ruleId"], "naming.bannedSuffixes");
}

#[test]
fn test_sarif_report_shape() {
    let tmp = TempDir::new().unwrap();
    fixture(tmp.path());
    run_fixture(tmp.path());
    let sarif: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(tmp.path().join(".shamash/shamash-report.sarif.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(sarif["version"], "2.1.0");
    let run = &sarif["runs"][0];
    assert_eq!(run["tool"]["driver"]["name"], "shamash");
    assert_eq!(run["invocations"][0]["startTimeUtc"], "2026-01-15T12:00:00Z");
    let results = run["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["level"], "error");
    assert_eq!(results[1]["level"], "warning");
    assert!(results[0]["partialFingerprints"]["primaryLocationLineHash"]
        .as_str()
        .unwrap()
        .len()
        == 64);
    let rules = run["tool"]["driver"]["rules"].as_array().unwrap();
    assert_eq!(rules.len(), 2);
}

#[test]
fn test_xml_report_well_formed_enough() {
    let tmp = TempDir::new().unwrap();
    fixture(tmp.path());
    run_fixture(tmp.path());
    let xml = fs::read_to_string(tmp.path().join(".shamash/shamash-report.xml")).unwrap();
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(xml.contains("<shamashReport"));
    assert!(xml.trim_end().ends_with("</shamashReport>"));
    assert_eq!(xml.matches("<finding ").count(), 2);
}

#[test]
fn test_roles_sidecar_contents() {
    let tmp = TempDir::new().unwrap();
    fixture(tmp.path());
    run_fixture(tmp.path());
    let roles: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(tmp.path().join(".shamash/roles.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(roles["com.pit.AdminController"], "controller");
    assert_eq!(roles["com.pit.UserRepository"], "repository");
    assert!(roles.get("com.pit.LoneManager").is_none());
}

#[test]
fn test_rule_plan_sidecar_contents() {
    let tmp = TempDir::new().unwrap();
    fixture(tmp.path());
    run_fixture(tmp.path());
    let plan: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(tmp.path().join(".shamash/rule-plan.json")).unwrap(),
    )
    .unwrap();
    let entries = plan.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["id"], "arch.forbiddenRoleDependencies");
    assert_eq!(entries[0]["classesInScope"], 3);
}

#[test]
fn test_facts_sidecar_round_trips() {
    let tmp = TempDir::new().unwrap();
    fixture(tmp.path());
    run_fixture(tmp.path());
    let text = fs::read_to_string(tmp.path().join(".shamash/facts.json")).unwrap();
    let index: shamash::FactIndex = serde_json::from_str(&text).unwrap();
    assert_eq!(index.classes.len(), 3);
    assert!(index.classes.iter().any(|c| c.fqn() == "com.pit.AdminController"));
}

#[test]
fn test_compressed_facts_sidecar() {
    let tmp = TempDir::new().unwrap();
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/Only"));
    write_policy(
        tmp.path(),
        &policy_with("export:\n  formats: [JSON]\n  sidecars: [FACTS]\n  factsCompressed: true\n"),
    );
    run_fixture(tmp.path());
    assert!(tmp.path().join(".shamash/facts.jsonl.gz").exists());
    assert!(!tmp.path().join(".shamash/facts.json").exists());
}

#[test]
fn test_custom_output_dir() {
    let tmp = TempDir::new().unwrap();
    fixture(tmp.path());
    let mut config = fixed_config(tmp.path());
    config.output_dir = Some(tmp.path().join("reports/shamash"));
    let result = run_with_config(&config, &CancelToken::new()).unwrap();
    assert!(tmp.path().join("reports/shamash/shamash-report.json").exists());
    let export = result.export.unwrap();
    assert!(export.written.contains(&"shamash-report.json".to_string()));
}
