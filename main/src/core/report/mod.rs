use chrono::{DateTime, SecondsFormat, Utc};

use crate::api::export::{ExportedFinding, ExportedReport};
use crate::api::types::{EngineError, EngineSummary, Finding};
use crate::core::baseline::fingerprint;

pub mod html;
pub mod json;
pub mod sarif;
pub mod sidecar;
pub mod xml;

/// Inputs shared by every exporter that must be identical for byte-identical
/// reruns. The timestamp is injected, never sampled inside an exporter.
#[derive(Debug, Clone)]
pub struct ExportContext {
    /// Normalized project root.
    pub project_root: String,
    /// Generation timestamp.
    pub generated_at: DateTime<Utc>,
}

impl ExportContext {
    /// ISO-UTC form used by the report header and SARIF invocation.
    pub fn timestamp(&self) -> String {
        self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Transform suppressed findings into the exported report: fingerprints
/// computed, optionals null-coalesced, sorted by the export total order
/// (path, rule id, severity rank, class, member, fingerprint, message).
pub fn build_report(
    findings: &[Finding],
    summary: EngineSummary,
    errors: Vec<EngineError>,
    ctx: &ExportContext,
) -> ExportedReport {
    let mut exported: Vec<ExportedFinding> = findings
        .iter()
        .map(|f| ExportedFinding {
            rule_id: f.rule_id.as_str().to_string(),
            severity: f.severity,
            message: f.message.clone(),
            file_path: f.file_path.clone(),
            class_fqn: f.class_fqn.clone().unwrap_or_default(),
            member: f.member.clone().unwrap_or_default(),
            start: f.start,
            end: f.end,
            fingerprint: fingerprint(f),
            data: f.data.clone(),
        })
        .collect();

    exported.sort_by(|a, b| {
        a.file_path
            .cmp(&b.file_path)
            .then_with(|| a.rule_id.cmp(&b.rule_id))
            .then_with(|| a.severity.rank().cmp(&b.severity.rank()))
            .then_with(|| a.class_fqn.cmp(&b.class_fqn))
            .then_with(|| a.member.cmp(&b.member))
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
            .then_with(|| a.message.cmp(&b.message))
    });

    ExportedReport {
        version: 1,
        tool: "shamash".to_string(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        generated_at: ctx.timestamp(),
        project_root: ctx.project_root.clone(),
        summary,
        findings: exported,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{RuleId, Severity};
    use chrono::TimeZone;

    fn ctx() -> ExportContext {
        ExportContext {
            project_root: "/work/demo".to_string(),
            generated_at: Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap(),
        }
    }

    fn finding(path: &str, rule: &str, severity: Severity) -> Finding {
        Finding::new(RuleId::from(rule), severity, path, "m")
    }

    #[test]
    fn test_sort_order() {
        let findings = vec![
            finding("b.class", "a.a", Severity::Error),
            finding("a.class", "z.z", Severity::Info),
            finding("a.class", "a.a", Severity::Warning),
            finding("a.class", "a.a", Severity::Error),
        ];
        let report = build_report(&findings, EngineSummary::default(), vec![], &ctx());
        let keys: Vec<(String, String)> = report
            .findings
            .iter()
            .map(|f| (f.file_path.clone(), f.rule_id.clone()))
            .collect();
        assert_eq!(keys[0], ("a.class".to_string(), "a.a".to_string()));
        assert_eq!(report.findings[0].severity, Severity::Error);
        assert_eq!(report.findings[1].severity, Severity::Warning);
        assert_eq!(keys[2], ("a.class".to_string(), "z.z".to_string()));
        assert_eq!(keys[3], ("b.class".to_string(), "a.a".to_string()));
    }

    #[test]
    fn test_null_coalesced_optionals() {
        let report = build_report(
            &[finding("a.class", "a.a", Severity::Error)],
            EngineSummary::default(),
            vec![],
            &ctx(),
        );
        assert_eq!(report.findings[0].class_fqn, "");
        assert_eq!(report.findings[0].member, "");
        assert_eq!(report.findings[0].start, None);
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(ctx().timestamp(), "2026-01-15T12:00:00Z");
    }
}
