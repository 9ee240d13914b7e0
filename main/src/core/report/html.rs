use std::fmt::Write as _;

use crate::api::export::ExportedReport;
use crate::api::traits::Exporter;
use crate::api::types::{RunError, Severity};

/// Standalone HTML report: summary header, findings table with severity
/// badges, engine-error table. Every cell is escaped.
pub struct HtmlExporter;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn badge_class(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "sev-error",
        Severity::Warning => "sev-warning",
        Severity::Info => "sev-info",
    }
}

/// `Class#member` when a member is present, the class alone otherwise.
fn owner_of(class_fqn: &str, member: &str) -> String {
    match (class_fqn.is_empty(), member.is_empty()) {
        (true, _) => String::new(),
        (false, true) => class_fqn.to_string(),
        (false, false) => format!("{}#{}", class_fqn, member),
    }
}

const STYLE: &str = "\
body{font-family:sans-serif;margin:2em;color:#222}\
table{border-collapse:collapse;width:100%}\
th,td{border:1px solid #ccc;padding:4px 8px;text-align:left;font-size:14px}\
th{background:#f0f0f0}\
.badge{padding:1px 8px;border-radius:8px;font-size:12px;color:#fff}\
.sev-error{background:#c62828}\
.sev-warning{background:#ef6c00}\
.sev-info{background:#1565c0}\
";

impl Exporter for HtmlExporter {
    fn file_name(&self) -> &str {
        "shamash-report.html"
    }

    fn render(&self, report: &ExportedReport) -> Result<Vec<u8>, RunError> {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
        let _ = writeln!(html, "<title>shamash report</title>");
        let _ = writeln!(html, "<style>{}</style>", STYLE);
        html.push_str("</head>\n<body>\n");
        let _ = writeln!(html, "<h1>shamash report</h1>");
        let s = &report.summary;
        let _ = writeln!(
            html,
            "<p>Generated {} · {} classes · {} findings ({} errors, {} warnings, {} infos)</p>",
            escape(&report.generated_at),
            s.classes,
            report.findings.len(),
            s.findings_by_severity[0],
            s.findings_by_severity[1],
            s.findings_by_severity[2],
        );

        html.push_str("<h2>Findings</h2>\n<table>\n<tr><th>Severity</th><th>Rule</th><th>Location</th><th>Owner</th><th>Message</th></tr>\n");
        for f in &report.findings {
            let _ = writeln!(
                html,
                "<tr><td><span class=\"badge {}\">{}</span></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                badge_class(f.severity),
                escape(f.severity.canonical_name()),
                escape(&f.rule_id),
                escape(&f.file_path),
                escape(&owner_of(&f.class_fqn, &f.member)),
                escape(&f.message),
            );
        }
        html.push_str("</table>\n");

        if !report.errors.is_empty() {
            html.push_str("<h2>Engine errors</h2>\n<table>\n<tr><th>Phase</th><th>Rule</th><th>Message</th></tr>\n");
            for error in &report.errors {
                let _ = writeln!(
                    html,
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                    escape(&error.phase),
                    escape(error.rule_id.as_ref().map(|r| r.as_str()).unwrap_or("")),
                    escape(&error.message),
                );
            }
            html.push_str("</table>\n");
        }

        html.push_str("</body>\n</html>\n");
        Ok(html.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::export::ExportedFinding;
    use crate::api::types::EngineSummary;
    use indexmap::IndexMap;

    #[test]
    fn test_owner_rendering() {
        assert_eq!(owner_of("com.a.B", "run"), "com.a.B#run");
        assert_eq!(owner_of("com.a.B", ""), "com.a.B");
        assert_eq!(owner_of("", "run"), "");
    }

    #[test]
    fn test_cells_escaped_and_badged() {
        let report = ExportedReport {
            version: 1,
            tool: "shamash".to_string(),
            tool_version: "0.1.0".to_string(),
            generated_at: "2026-01-15T12:00:00Z".to_string(),
            project_root: "/w".to_string(),
            summary: EngineSummary::default(),
            findings: vec![ExportedFinding {
                rule_id: "a.b".to_string(),
                severity: Severity::Warning,
                message: "<script>alert(1)</script>".to_string(),
                file_path: "out/A.class".to_string(),
                class_fqn: "A".to_string(),
                member: String::new(),
                start: None,
                end: None,
                fingerprint: "aa".repeat(32),
                data: IndexMap::new(),
            }],
            errors: vec![],
        };
        let text = String::from_utf8(HtmlExporter.render(&report).unwrap()).unwrap();
        assert!(text.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!text.contains("<script>alert(1)"));
        assert!(text.contains("badge sev-warning"));
    }
}
