use serde_json::{json, Value};

use crate::api::export::ExportedReport;
use crate::api::traits::Exporter;
use crate::api::types::{RunError, Severity};

/// SARIF 2.1.0 report. The rule catalog is built from the distinct rule ids
/// of the exported findings; the fingerprint rides in
/// `partialFingerprints.primaryLocationLineHash`.
pub struct SarifExporter;

fn level_of(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Info => "note",
    }
}

impl Exporter for SarifExporter {
    fn file_name(&self) -> &str {
        "shamash-report.sarif.json"
    }

    fn render(&self, report: &ExportedReport) -> Result<Vec<u8>, RunError> {
        let mut rule_ids: Vec<&str> = report.findings.iter().map(|f| f.rule_id.as_str()).collect();
        rule_ids.sort();
        rule_ids.dedup();
        let rules: Vec<Value> = rule_ids
            .iter()
            .map(|id| {
                json!({
                    "id": id,
                    "name": id,
                })
            })
            .collect();
        let rule_index_of = |id: &str| rule_ids.iter().position(|r| *r == id);

        let results: Vec<Value> = report
            .findings
            .iter()
            .map(|f| {
                let mut region = serde_json::Map::new();
                if let Some(start) = f.start {
                    region.insert("charOffset".to_string(), json!(start));
                }
                if let Some(end) = f.end {
                    if let Some(start) = f.start {
                        region.insert("charLength".to_string(), json!(end.saturating_sub(start)));
                    }
                }
                let mut physical = json!({
                    "artifactLocation": {
                        "uri": f.file_path,
                    }
                });
                if !region.is_empty() {
                    physical["region"] = Value::Object(region);
                }
                json!({
                    "ruleId": f.rule_id,
                    "ruleIndex": rule_index_of(&f.rule_id),
                    "level": level_of(f.severity),
                    "message": { "text": f.message },
                    "locations": [{ "physicalLocation": physical }],
                    "partialFingerprints": {
                        "primaryLocationLineHash": f.fingerprint,
                    }
                })
            })
            .collect();

        let sarif = json!({
            "$schema": "https://raw.githubusercontent.com/oasis-tcs/sarif-spec/master/Schemata/sarif-schema-2.1.0.json",
            "version": "2.1.0",
            "runs": [{
                "tool": {
                    "driver": {
                        "name": report.tool,
                        "version": report.tool_version,
                        "informationUri": "https://github.com/sweengineeringlabs/shamash",
                        "rules": rules,
                    }
                },
                "invocations": [{
                    "executionSuccessful": report.errors.is_empty(),
                    "startTimeUtc": report.generated_at,
                }],
                "results": results,
            }]
        });
        let mut bytes = serde_json::to_vec_pretty(&sarif)
            .map_err(|e| RunError::Config(format!("SARIF serialization failed: {}", e)))?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
