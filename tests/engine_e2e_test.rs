mod common;

use std::fs;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use common::{policy_with, write_class, write_policy, ClassFileBuilder, CodeOp};
use shamash::{run, run_with_config, CancelToken, EngineConfig, Severity};

const ACC_PUBLIC: u16 = 0x0001;
const ACC_PRIVATE: u16 = 0x0002;
const ACC_STATIC: u16 = 0x0008;

fn fixed_config(root: &std::path::Path) -> EngineConfig {
    let mut config = EngineConfig::new(root);
    config.generated_at = Some(Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap());
    config
}

// --- §8 scenario 1: forbidden role dependency ---

#[test]
fn test_forbidden_role_dependency_end_to_end() {
    let tmp = TempDir::new().unwrap();
    write_class(
        tmp.path(),
        ClassFileBuilder::new("com/pit/AdminController")
            .field(ACC_PRIVATE, "repo", "Lcom/pit/UserRepository;"),
    );
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/UserRepository"));
    write_policy(
        tmp.path(),
        &policy_with(
            r#"roles:
  - id: controller
    match:
      classNameEndsWith: Controller
  - id: repository
    match:
      classNameEndsWith: Repository
rules:
  - id: arch.forbiddenRoleDependencies
    severity: error
    params:
      forbidden:
        - from: controller
          to: [repository]
"#,
        ),
    );

    let result = run(tmp.path()).unwrap();
    assert!(result.is_success());
    assert_eq!(result.findings.len(), 1);
    let finding = &result.findings[0];
    assert_eq!(finding.rule_id.as_str(), "arch.forbiddenRoleDependencies");
    assert_eq!(finding.class_fqn.as_deref(), Some("com.pit.AdminController"));
    assert_eq!(finding.severity, Severity::Error);
}

// --- §8 scenario 2: role placement ---

#[test]
fn test_role_placement_end_to_end() {
    let tmp = TempDir::new().unwrap();
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/app/web/UserController"));
    write_policy(
        tmp.path(),
        &policy_with(
            r#"roles:
  - id: controller
    match:
      classNameEndsWith: Controller
rules:
  - id: packages.rolePlacement
    severity: warning
    params:
      expected:
        controller:
          packageRegex: "^.*\\.controller(\\..*)?$"
"#,
        ),
    );

    let result = run(tmp.path()).unwrap();
    assert_eq!(result.findings.len(), 1);
    let finding = &result.findings[0];
    assert_eq!(finding.rule_id.as_str(), "packages.rolePlacement");
    assert_eq!(finding.class_fqn.as_deref(), Some("com.pit.app.web.UserController"));
}

// --- §8 scenario 3: dead private members ---

#[test]
fn test_unused_private_members_end_to_end() {
    let tmp = TempDir::new().unwrap();
    write_class(
        tmp.path(),
        ClassFileBuilder::new("com/pit/Holder")
            .field(ACC_PRIVATE, "unusedCount", "I")
            .method(ACC_PRIVATE, "unusedSecret", "()Ljava/lang/String;", vec![])
            .method(ACC_PUBLIC, "run", "()V", vec![CodeOp::Return]),
    );
    write_policy(
        tmp.path(),
        &policy_with(
            r#"rules:
  - id: deadcode.unusedPrivateMembers
    severity: warning
    params: {}
"#,
        ),
    );

    let result = run(tmp.path()).unwrap();
    assert_eq!(result.findings.len(), 2);
    let mut members: Vec<&str> = result
        .findings
        .iter()
        .map(|f| f.data["memberName"].as_str())
        .collect();
    members.sort();
    assert_eq!(members, vec!["unusedCount", "unusedSecret"]);
}

// --- §8 scenario 4: cycle detection ---

#[test]
fn test_cycle_detection_end_to_end() {
    let tmp = TempDir::new().unwrap();
    write_class(
        tmp.path(),
        ClassFileBuilder::new("com/pit/A").field(ACC_PRIVATE, "b", "Lcom/pit/B;"),
    );
    write_class(
        tmp.path(),
        ClassFileBuilder::new("com/pit/B").field(ACC_PRIVATE, "a", "Lcom/pit/A;"),
    );
    write_policy(
        tmp.path(),
        &policy_with(
            r#"analysis:
  enabled: true
  granularity: CLASS
rules:
  - id: graph.noCycles
    severity: error
export:
  formats: [JSON]
  sidecars: [ANALYSIS_GRAPHS]
"#,
        ),
    );

    let result = run(tmp.path()).unwrap();
    assert_eq!(result.findings.len(), 1);
    let finding = &result.findings[0];
    assert_eq!(finding.rule_id.as_str(), "graph.noCycles");
    assert_eq!(finding.data["size"], "2");
    assert_eq!(finding.data["cycle"], "com.pit.A -> com.pit.B -> com.pit.A");

    let graphs: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(tmp.path().join(".shamash/analysis-graphs.json")).unwrap(),
    )
    .unwrap();
    let sccs = graphs["cyclicSccs"].as_array().unwrap();
    assert_eq!(sccs.len(), 1);
    assert_eq!(sccs[0].as_array().unwrap().len(), 2);
    let cycles = graphs["cycles"].as_array().unwrap();
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].as_array().unwrap().len(), 3);
}

// --- §8 scenario 5: baseline generate then use ---

#[test]
fn test_baseline_generate_then_use() {
    let tmp = TempDir::new().unwrap();
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/UserManager"));
    let policy = policy_with(
        r#"rules:
  - id: naming.bannedSuffixes
    severity: warning
    params:
      banned: [Manager]
"#,
    );
    write_policy(tmp.path(), &policy);

    let mut generate = fixed_config(tmp.path());
    generate.baseline_mode = Some(shamash::BaselineMode::Generate);
    let first = run_with_config(&generate, &CancelToken::new()).unwrap();
    assert_eq!(first.findings.len(), 1);

    let baseline: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(tmp.path().join(".shamash/baseline.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(baseline["fingerprints"].as_array().unwrap().len(), 1);

    let mut use_mode = fixed_config(tmp.path());
    use_mode.baseline_mode = Some(shamash::BaselineMode::Use);
    let second = run_with_config(&use_mode, &CancelToken::new()).unwrap();
    assert!(second.findings.is_empty());
    assert_eq!(second.summary.suppressed_by_baseline, 1);

    let report: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(tmp.path().join(".shamash/shamash-report.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["findings"].as_array().unwrap().len(), 0);
}

// --- §8 scenario 6: path portability ---

#[test]
fn test_relocated_project_same_fingerprints() {
    let build = |root: &std::path::Path| {
        write_class(root, ClassFileBuilder::new("com/pit/UserManager"));
        write_policy(
            root,
            &policy_with(
                r#"rules:
  - id: naming.bannedSuffixes
    severity: warning
    params:
      banned: [Manager]
"#,
            ),
        );
    };
    let first_home = TempDir::new().unwrap();
    let second_home = TempDir::new().unwrap();
    build(first_home.path());
    build(second_home.path());

    let first = run_with_config(&fixed_config(first_home.path()), &CancelToken::new()).unwrap();
    let second = run_with_config(&fixed_config(second_home.path()), &CancelToken::new()).unwrap();

    let fingerprints = |root: &std::path::Path| -> Vec<String> {
        let report: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(root.join(".shamash/shamash-report.json")).unwrap(),
        )
        .unwrap();
        report["findings"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["fingerprint"].as_str().unwrap().to_string())
            .collect()
    };
    assert_eq!(first.findings.len(), 1);
    assert_eq!(second.findings.len(), 1);
    assert_eq!(fingerprints(first_home.path()), fingerprints(second_home.path()));
    assert_eq!(first.findings[0].file_path, second.findings[0].file_path);
}

// --- boundary behaviors ---

#[test]
fn test_empty_policy_no_rules_zero_findings() {
    let tmp = TempDir::new().unwrap();
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/Anything"));
    write_policy(tmp.path(), &policy_with(""));
    let result = run(tmp.path()).unwrap();
    assert!(result.findings.is_empty());
    assert!(result.is_success());
    assert_eq!(result.summary.classes, 1);
}

#[test]
fn test_malformed_class_is_one_facts_error() {
    let tmp = TempDir::new().unwrap();
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/Good"));
    fs::create_dir_all(tmp.path().join("out/com/pit")).unwrap();
    fs::write(tmp.path().join("out/com/pit/Bad.class"), b"garbage").unwrap();
    write_policy(tmp.path(), &policy_with(""));
    let result = run(tmp.path()).unwrap();
    assert!(result.is_success());
    assert_eq!(result.summary.classes, 1);
    assert_eq!(result.summary.facts_errors.len(), 1);
    assert_eq!(result.summary.facts_errors[0].origin_id, "out/com/pit/Bad.class");
}

#[test]
fn test_exception_suppresses_matching_finding() {
    let tmp = TempDir::new().unwrap();
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/legacy/OldManager"));
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/fresh/NewManager"));
    write_policy(
        tmp.path(),
        &policy_with(
            r#"rules:
  - id: naming.bannedSuffixes
    severity: warning
    params:
      banned: [Manager]
exceptions:
  - reason: grandfathered
    match:
      packageRegex: "^com\\.pit\\.legacy$"
"#,
        ),
    );
    let result = run(tmp.path()).unwrap();
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].class_fqn.as_deref(), Some("com.pit.fresh.NewManager"));
    assert_eq!(result.summary.suppressed_by_exceptions, 1);
}

#[test]
fn test_expired_exception_warns_and_still_applies() {
    let tmp = TempDir::new().unwrap();
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/OldManager"));
    write_policy(
        tmp.path(),
        &policy_with(
            r#"rules:
  - id: naming.bannedSuffixes
    severity: warning
    params:
      banned: [Manager]
exceptions:
  - expiresOn: "2020-01-01"
    match:
      ruleId: naming.bannedSuffixes
"#,
        ),
    );
    let result = run_with_config(&fixed_config(tmp.path()), &CancelToken::new()).unwrap();
    assert!(result.findings.is_empty());
    assert_eq!(result.summary.suppressed_by_exceptions, 1);
    assert!(result
        .validation_warnings
        .iter()
        .any(|w| w.path == "exceptions[0].expiresOn"));
}

#[test]
fn test_scope_filter_restricts_rule() {
    let tmp = TempDir::new().unwrap();
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/web/PageManager"));
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/db/StoreManager"));
    write_policy(
        tmp.path(),
        &policy_with(
            r#"rules:
  - id: naming.bannedSuffixes
    severity: warning
    scope:
      includePackages: ["^com\\.pit\\.web$"]
    params:
      banned: [Manager]
"#,
        ),
    );
    let result = run(tmp.path()).unwrap();
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].class_fqn.as_deref(), Some("com.pit.web.PageManager"));
}

#[test]
fn test_role_priority_tie_breaks_on_id() {
    let tmp = TempDir::new().unwrap();
    write_class(
        tmp.path(),
        ClassFileBuilder::new("com/pit/DualController")
            .field(ACC_PRIVATE, "x", "Lcom/pit/Other;"),
    );
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/Other"));
    write_policy(
        tmp.path(),
        &policy_with(
            r#"roles:
  - id: zebra
    priority: 5
    match:
      classNameEndsWith: Controller
  - id: alpha
    priority: 5
    match:
      classNameEndsWith: Controller
rules:
  - id: metrics.maxFanOut
    severity: error
    roles: [alpha]
    params:
      max: 0
"#,
        ),
    );
    // Tie at priority 5 resolves to 'alpha'; the rule scoped to alpha fires.
    let result = run(tmp.path()).unwrap();
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].class_fqn.as_deref(), Some("com.pit.DualController"));
}

#[test]
fn test_main_method_and_annotation_matchers() {
    let tmp = TempDir::new().unwrap();
    write_class(
        tmp.path(),
        ClassFileBuilder::new("com/pit/Entry")
            .method(ACC_PUBLIC | ACC_STATIC, "main", "([Ljava/lang/String;)V", vec![CodeOp::Return]),
    );
    write_class(
        tmp.path(),
        ClassFileBuilder::new("com/pit/Svc").annotated("org.framework.Service"),
    );
    write_policy(
        tmp.path(),
        &policy_with(
            r#"roles:
  - id: entrypoint
    priority: 10
    match:
      hasMainMethod: true
  - id: service
    priority: 5
    match:
      annotationPrefix: org.framework
rules:
  - id: metrics.maxMethodsByRole
    severity: error
    params:
      limits:
        entrypoint: 0
        service: 0
"#,
        ),
    );
    let result = run(tmp.path()).unwrap();
    // Entry declares main (counted); Svc declares nothing.
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].class_fqn.as_deref(), Some("com.pit.Entry"));
    assert_eq!(result.findings[0].data["role"], "entrypoint");
}

#[test]
fn test_unknown_rule_warn_policy_skips_rule() {
    let tmp = TempDir::new().unwrap();
    write_class(tmp.path(), ClassFileBuilder::new("com/pit/X"));
    write_policy(
        tmp.path(),
        r#"version: 1
project:
  bytecodeRoots: ["out"]
  validation:
    unknownRule: WARN
rules:
  - id: custom.notInstalled
"#,
    );
    let result = run(tmp.path()).unwrap();
    assert!(result.is_success());
    assert!(result.findings.is_empty());
    assert!(result
        .validation_warnings
        .iter()
        .any(|w| w.message.contains("custom.notInstalled")));
}

#[test]
fn test_method_call_dependency_edges() {
    let tmp = TempDir::new().unwrap();
    write_class(
        tmp.path(),
        ClassFileBuilder::new("com/pit/Caller").method(
            ACC_PUBLIC,
            "go",
            "()V",
            vec![
                CodeOp::InvokeStatic("com/pit/Target", "helper", "()V"),
                CodeOp::Return,
            ],
        ),
    );
    write_class(
        tmp.path(),
        ClassFileBuilder::new("com/pit/Target")
            .method(ACC_PUBLIC | ACC_STATIC, "helper", "()V", vec![CodeOp::Return]),
    );
    write_policy(
        tmp.path(),
        &policy_with(
            r#"rules:
  - id: metrics.maxFanOut
    severity: error
    params:
      max: 0
"#,
        ),
    );
    let result = run(tmp.path()).unwrap();
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].class_fqn.as_deref(), Some("com.pit.Caller"));
}
