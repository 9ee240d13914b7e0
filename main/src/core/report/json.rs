use crate::api::export::ExportedReport;
use crate::api::traits::Exporter;
use crate::api::types::RunError;

/// Canonical JSON report. Field order is the struct order of the export
/// model; serde escapes control characters as `\uXXXX`.
pub struct JsonExporter;

impl Exporter for JsonExporter {
    fn file_name(&self) -> &str {
        "shamash-report.json"
    }

    fn render(&self, report: &ExportedReport) -> Result<Vec<u8>, RunError> {
        let mut bytes = serde_json::to_vec_pretty(report)
            .map_err(|e| RunError::Config(format!("JSON serialization failed: {}", e)))?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::export::ExportedFinding;
    use crate::api::types::{EngineSummary, Severity};
    use indexmap::IndexMap;

    fn report() -> ExportedReport {
        ExportedReport {
            version: 1,
            tool: "shamash".to_string(),
            tool_version: "0.1.0".to_string(),
            generated_at: "2026-01-15T12:00:00Z".to_string(),
            project_root: "/work/demo".to_string(),
            summary: EngineSummary::default(),
            findings: vec![ExportedFinding {
                rule_id: "naming.bannedSuffixes".to_string(),
                severity: Severity::Warning,
                message: "control char \u{0001} inside".to_string(),
                file_path: "out/A.class".to_string(),
                class_fqn: "A".to_string(),
                member: String::new(),
                start: None,
                end: None,
                fingerprint: "ab".repeat(32),
                data: IndexMap::new(),
            }],
            errors: vec![],
        }
    }

    #[test]
    fn test_control_chars_escaped() {
        let bytes = JsonExporter.render(&report()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("\\u0001"));
    }

    #[test]
    fn test_round_trips() {
        let bytes = JsonExporter.render(&report()).unwrap();
        let back: ExportedReport = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, report());
    }

    #[test]
    fn test_byte_identical_for_identical_input() {
        assert_eq!(
            JsonExporter.render(&report()).unwrap(),
            JsonExporter.render(&report()).unwrap()
        );
    }
}
