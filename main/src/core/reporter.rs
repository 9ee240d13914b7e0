use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde_json::json;

use crate::api::types::{EngineResult, Finding};

/// Human-readable console summary, findings grouped by rule.
pub struct TextReporter;

impl TextReporter {
    /// Render the result as plain text.
    pub fn report(&self, result: &EngineResult) -> String {
        let mut out = String::new();
        let s = &result.summary;
        let _ = writeln!(
            out,
            "Scanned {} classes ({} methods, {} fields, {} edges)",
            s.classes, s.methods, s.fields, s.edges
        );
        if s.suppressed_by_exceptions + s.suppressed_by_baseline > 0 {
            let _ = writeln!(
                out,
                "Suppressed {} by exceptions, {} by baseline",
                s.suppressed_by_exceptions, s.suppressed_by_baseline
            );
        }

        let mut by_rule: BTreeMap<&str, Vec<&Finding>> = BTreeMap::new();
        for finding in &result.findings {
            by_rule.entry(finding.rule_id.as_str()).or_default().push(finding);
        }
        for (rule_id, findings) in &by_rule {
            let _ = writeln!(out, "\n{} ({} finding(s))", rule_id, findings.len());
            for finding in findings {
                let owner = match (&finding.class_fqn, &finding.member) {
                    (Some(class), Some(member)) => format!("{}#{}", class, member),
                    (Some(class), None) => class.clone(),
                    _ => finding.file_path.clone(),
                };
                let _ = writeln!(
                    out,
                    "  [{}] {}: {}",
                    finding.severity.canonical_name(),
                    owner,
                    finding.message
                );
            }
        }

        for warning in &result.validation_warnings {
            let _ = writeln!(out, "\nWARN {}: {}", warning.path, warning.message);
        }
        for error in &result.errors {
            let _ = writeln!(out, "\nENGINE ERROR [{}] {}", error.phase, error.message);
        }
        let _ = writeln!(
            out,
            "\n{} error(s), {} warning(s), {} info(s)",
            s.findings_by_severity[0], s.findings_by_severity[1], s.findings_by_severity[2]
        );
        out
    }
}

/// Pretty-printed JSON console output.
pub struct JsonReporter;

impl JsonReporter {
    /// Render the result as JSON.
    pub fn report(&self, result: &EngineResult) -> String {
        let value = json!({
            "summary": result.summary,
            "findings": result.findings,
            "errors": result.errors,
            "validationWarnings": result.validation_warnings,
            "export": result.export,
            "success": result.is_success(),
        });
        let mut text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_string());
        text.push('\n');
        text
    }
}
