use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::api::config::{BaselineMode, ReportFormatKind, SidecarKind};
use crate::api::traits::Exporter;
use crate::api::types::{
    EngineError, EngineResult, EngineSummary, ExportOutcome, RunError, ValidationSeverity,
};
use crate::core::baseline::{apply_baseline, fingerprint, BaselineStore};
use crate::core::config::{load_policy_file, locate_policy, schema, semantic};
use crate::core::exceptions::{apply_exceptions, compile_exceptions};
use crate::core::facts::scanner::{scan_project, CancelToken};
use crate::core::graph::analyze_graph;
use crate::core::hotspots::compute_hotspots;
use crate::core::paths::normalize_path;
use crate::core::report::html::HtmlExporter;
use crate::core::report::json::JsonExporter;
use crate::core::report::sarif::SarifExporter;
use crate::core::report::xml::XmlExporter;
use crate::core::report::{build_report, sidecar, ExportContext};
use crate::core::roles::RoleIndex;
use crate::core::rules::{evaluate_rules, plan_rules, RuleRegistry};
use crate::core::scoring::compute_scores;

/// One run's configuration: the project root plus host-side overrides of the
/// policy document.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The project root all paths relativize against.
    pub project_root: PathBuf,
    /// Explicit policy path; `None` probes `shamash.yml` / `shamash.yaml`.
    pub policy_path: Option<PathBuf>,
    /// Output directory override.
    pub output_dir: Option<PathBuf>,
    /// Baseline mode override.
    pub baseline_mode: Option<BaselineMode>,
    /// Analysis toggle override.
    pub analysis: Option<bool>,
    /// Evaluate rules in parallel.
    pub parallel: bool,
    /// Timestamp for the report bundle; fix it to make reruns byte-identical.
    pub generated_at: Option<DateTime<Utc>>,
}

impl EngineConfig {
    /// Defaults for a project root: probe the policy, honor it verbatim,
    /// evaluate in parallel.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        EngineConfig {
            project_root: project_root.into(),
            policy_path: None,
            output_dir: None,
            baseline_mode: None,
            analysis: None,
            parallel: true,
            generated_at: None,
        }
    }
}

/// Run the full pipeline: locate policy → validate → extract → assign roles
/// → evaluate rules → analyze → suppress → export.
pub fn run(config: &EngineConfig, cancel: &CancelToken) -> Result<EngineResult, RunError> {
    run_with_registry(config, &RuleRegistry::builtin(), cancel)
}

/// Like [`run`], with a caller-supplied registry (built-ins plus extensions).
pub fn run_with_registry(
    config: &EngineConfig,
    registry: &RuleRegistry,
    cancel: &CancelToken,
) -> Result<EngineResult, RunError> {
    let root = &config.project_root;
    if !root.exists() {
        return Err(RunError::Path(format!("Path '{}' does not exist", root.display())));
    }
    let generated_at = config.generated_at.unwrap_or_else(Utc::now);

    // 1. Locate and parse the policy.
    let policy_path = match &config.policy_path {
        Some(p) => p.clone(),
        None => locate_policy(root).ok_or_else(|| {
            RunError::Config(format!(
                "no policy found under '{}' (expected shamash.yml or shamash.yaml)",
                root.display()
            ))
        })?,
    };
    info!(policy = %policy_path.display(), "loading policy");
    let loaded = load_policy_file(&policy_path)?;

    // 2. Structural validation, then semantic validation. Warnings
    //    accumulate; any blocking error aborts before extraction.
    let schema_errors = schema::validate_schema(&loaded.raw);
    if !schema_errors.is_empty() {
        return Err(RunError::Validation(schema_errors));
    }
    let diagnostics =
        semantic::validate_semantics(&loaded.doc, registry, generated_at.date_naive());
    if diagnostics.iter().any(|d| d.severity == ValidationSeverity::Error) {
        return Err(RunError::Validation(diagnostics));
    }
    let validation_warnings = diagnostics;
    let policy = &loaded.doc;

    let mut engine_errors: Vec<EngineError> = Vec::new();

    // 3. Fact extraction, bounded by scan limits.
    let scan = scan_project(root, &policy.project, cancel)?;
    if let Some(breach) = scan.limit_breach {
        engine_errors.push(EngineError {
            rule_id: None,
            phase: "scan:limit".to_string(),
            message: breach,
        });
    }
    let index = scan.index;
    debug!(classes = index.classes.len(), "fact index frozen");

    // 4. Role assignment.
    let role_index = RoleIndex::compile(&policy.roles).map_err(RunError::Validation)?;
    let roles = role_index.assign(&index);

    // 5. Rule evaluation.
    if cancel.is_cancelled() {
        return Err(RunError::Canceled);
    }
    let planned = plan_rules(registry, policy, &index, &roles).map_err(RunError::Validation)?;
    let (raw_findings, rule_errors) = evaluate_rules(&planned, &index, &roles, config.parallel);
    engine_errors.extend(rule_errors);
    debug!(findings = raw_findings.len(), "rule evaluation complete");

    // 6. Analysis artifacts.
    let analysis_enabled = config.analysis.unwrap_or(policy.analysis.enabled);
    let analysis = if analysis_enabled {
        let graph = analyze_graph(
            &index,
            policy.analysis.granularity,
            policy.analysis.include_external,
        );
        let hotspots = compute_hotspots(&index, &graph, policy.analysis.hotspots.top_n);
        let scores = compute_scores(&index, &policy.analysis.scoring);
        Some((graph, hotspots, scores))
    } else {
        None
    };

    // 7. Exceptions, then baseline.
    if cancel.is_cancelled() {
        return Err(RunError::Canceled);
    }
    let exceptions = compile_exceptions(&policy.exceptions).map_err(RunError::Validation)?;
    let (after_exceptions, suppressed_by_exceptions) =
        apply_exceptions(raw_findings, &exceptions, &roles);

    let out_dir = match &config.output_dir {
        Some(dir) => dir.clone(),
        None => root.join(&policy.export.output_dir),
    };
    let baseline_path = out_dir.join("baseline.json");
    let baseline_mode = config.baseline_mode.unwrap_or(policy.baseline.mode);
    let mut baseline_written = false;
    let (mut findings, suppressed_by_baseline) = match baseline_mode {
        BaselineMode::None => (after_exceptions, 0),
        BaselineMode::Generate => {
            let mut store = BaselineStore::from_findings(&after_exceptions);
            if policy.baseline.merge {
                match BaselineStore::load(&baseline_path) {
                    Ok(existing) => store.merge(&existing),
                    Err(e) => engine_errors.push(EngineError {
                        rule_id: None,
                        phase: "baseline:io".to_string(),
                        message: e.to_string(),
                    }),
                }
            }
            match store.save(&baseline_path) {
                Ok(()) => baseline_written = true,
                Err(e) => engine_errors.push(EngineError {
                    rule_id: None,
                    phase: "baseline:io".to_string(),
                    message: e.to_string(),
                }),
            }
            (after_exceptions, 0)
        }
        BaselineMode::Use => match BaselineStore::load(&baseline_path) {
            Ok(store) => apply_baseline(after_exceptions, &store),
            Err(e) => {
                engine_errors.push(EngineError {
                    rule_id: None,
                    phase: "baseline:io".to_string(),
                    message: e.to_string(),
                });
                (after_exceptions, 0)
            }
        },
    };

    // Export order over the remaining findings.
    findings.sort_by(|a, b| {
        a.file_path
            .cmp(&b.file_path)
            .then_with(|| a.rule_id.cmp(&b.rule_id))
            .then_with(|| a.severity.rank().cmp(&b.severity.rank()))
            .then_with(|| a.class_fqn.cmp(&b.class_fqn))
            .then_with(|| a.member.cmp(&b.member))
            .then_with(|| fingerprint(a).cmp(&fingerprint(b)))
            .then_with(|| a.message.cmp(&b.message))
    });

    let mut by_severity = [0usize; 3];
    for finding in &findings {
        by_severity[finding.severity.rank() as usize] += 1;
    }
    let summary = EngineSummary {
        classes: index.classes.len(),
        methods: index.methods.len(),
        fields: index.fields.len(),
        edges: index.edges.len(),
        external_buckets: index.external_buckets().len(),
        findings_by_severity: by_severity,
        suppressed_by_exceptions,
        suppressed_by_baseline,
        facts_errors: scan.facts_errors,
    };

    // 8. Export. No partial reports after cancellation; an I/O failure is
    //    fatal to the failing file only.
    if cancel.is_cancelled() {
        return Err(RunError::Canceled);
    }
    let export_ctx = ExportContext {
        project_root: normalize_path(root),
        generated_at,
    };
    let report = build_report(&findings, summary.clone(), engine_errors.clone(), &export_ctx);
    let mut written: Vec<String> = Vec::new();
    if baseline_written {
        written.push("baseline.json".to_string());
    }
    for format in &policy.export.formats {
        let exporter: Box<dyn Exporter> = match format {
            ReportFormatKind::Json => Box::new(JsonExporter),
            ReportFormatKind::Sarif => Box::new(SarifExporter),
            ReportFormatKind::Xml => Box::new(XmlExporter),
            ReportFormatKind::Html => Box::new(HtmlExporter),
        };
        match exporter.emit(&report, &out_dir) {
            Ok(()) => written.push(exporter.file_name().to_string()),
            Err(e) => engine_errors.push(EngineError {
                rule_id: None,
                phase: "export:io".to_string(),
                message: format!("{}: {}", exporter.file_name(), e),
            }),
        }
    }
    for kind in &policy.export.sidecars {
        let outcome = match kind {
            SidecarKind::Facts => {
                sidecar::write_facts(&index, policy.export.facts_compressed, &out_dir)
            }
            SidecarKind::Roles => sidecar::write_roles(&roles, &out_dir),
            SidecarKind::RulePlan => sidecar::write_rule_plan(&planned, &out_dir),
            SidecarKind::AnalysisGraphs => match &analysis {
                Some((graph, _, _)) => sidecar::write_graphs(graph, &out_dir),
                None => continue,
            },
            SidecarKind::AnalysisHotspots => match &analysis {
                Some((_, hotspots, _)) => sidecar::write_hotspots(hotspots, &out_dir),
                None => continue,
            },
            SidecarKind::AnalysisScores => match &analysis {
                Some((_, _, scores)) => sidecar::write_scores(scores, &out_dir),
                None => continue,
            },
        };
        match outcome {
            Ok(name) => written.push(name),
            Err(e) => engine_errors.push(EngineError {
                rule_id: None,
                phase: "export:io".to_string(),
                message: e.to_string(),
            }),
        }
    }

    info!(
        findings = findings.len(),
        errors = engine_errors.len(),
        "run complete"
    );
    Ok(EngineResult {
        summary,
        findings,
        errors: engine_errors,
        export: Some(ExportOutcome {
            output_dir: normalize_path(&out_dir),
            written,
        }),
        validation_warnings,
    })
}

/// Validate the policy only: structural then semantic diagnostics, no
/// extraction.
pub fn validate_only(config: &EngineConfig) -> Result<Vec<crate::api::types::ValidationError>, RunError> {
    let root = &config.project_root;
    if !root.exists() {
        return Err(RunError::Path(format!("Path '{}' does not exist", root.display())));
    }
    let policy_path = match &config.policy_path {
        Some(p) => p.clone(),
        None => locate_policy(root).ok_or_else(|| {
            RunError::Config(format!(
                "no policy found under '{}' (expected shamash.yml or shamash.yaml)",
                root.display()
            ))
        })?,
    };
    let loaded = load_policy_file(&policy_path)?;
    let mut diagnostics = schema::validate_schema(&loaded.raw);
    if diagnostics.is_empty() {
        let today = config
            .generated_at
            .unwrap_or_else(Utc::now)
            .date_naive();
        diagnostics = semantic::validate_semantics(&loaded.doc, &RuleRegistry::builtin(), today);
    }
    Ok(diagnostics)
}
