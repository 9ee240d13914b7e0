use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use serde_json::json;

use crate::api::facts::FactIndex;
use crate::api::types::{RunError, Severity};
use crate::core::graph::GraphAnalysis;
use crate::core::hotspots::HotspotAnalysis;
use crate::core::rules::PlannedRule;
use crate::core::scoring::ScoringAnalysis;

fn write_file(out_dir: &Path, name: &str, bytes: &[u8]) -> Result<String, RunError> {
    let path = out_dir.join(name);
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(&path, bytes)?;
    Ok(name.to_string())
}

fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>, RunError> {
    let mut bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| RunError::Config(format!("sidecar serialization failed: {}", e)))?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write the fact dump: `facts.json`, or `facts.jsonl.gz` with one record
/// per line when compression is requested.
pub fn write_facts(index: &FactIndex, compressed: bool, out_dir: &Path) -> Result<String, RunError> {
    if !compressed {
        return write_file(out_dir, "facts.json", &to_pretty_json(index)?);
    }
    let mut lines: Vec<u8> = Vec::new();
    let mut push_line = |value: serde_json::Value| -> Result<(), RunError> {
        let line = serde_json::to_vec(&value)
            .map_err(|e| RunError::Config(format!("sidecar serialization failed: {}", e)))?;
        lines.extend_from_slice(&line);
        lines.push(b'\n');
        Ok(())
    };
    for class in &index.classes {
        push_line(json!({"kind": "class", "fact": class}))?;
    }
    for method in &index.methods {
        push_line(json!({"kind": "method", "fact": method}))?;
    }
    for field in &index.fields {
        push_line(json!({"kind": "field", "fact": field}))?;
    }
    for edge in &index.edges {
        push_line(json!({"kind": "edge", "fact": edge}))?;
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&lines)?;
    let gz = encoder.finish()?;
    write_file(out_dir, "facts.jsonl.gz", &gz)
}

/// Write the role assignment: class FQN → role id.
pub fn write_roles(roles: &BTreeMap<String, String>, out_dir: &Path) -> Result<String, RunError> {
    write_file(out_dir, "roles.json", &to_pretty_json(roles)?)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RulePlanEntry<'a> {
    id: &'a str,
    severity: Severity,
    classes_in_scope: usize,
}

/// Write the resolved rule plan: which rules run, at what severity, against
/// how many classes.
pub fn write_rule_plan(planned: &[PlannedRule<'_>], out_dir: &Path) -> Result<String, RunError> {
    let entries: Vec<RulePlanEntry<'_>> = planned
        .iter()
        .map(|p| RulePlanEntry {
            id: p.rule_id.as_str(),
            severity: p.config.severity,
            classes_in_scope: p.in_scope.len(),
        })
        .collect();
    write_file(out_dir, "rule-plan.json", &to_pretty_json(&entries)?)
}

/// Write the graph analysis sidecar.
pub fn write_graphs(analysis: &GraphAnalysis, out_dir: &Path) -> Result<String, RunError> {
    write_file(out_dir, "analysis-graphs.json", &to_pretty_json(analysis)?)
}

/// Write the hotspot table sidecar.
pub fn write_hotspots(analysis: &HotspotAnalysis, out_dir: &Path) -> Result<String, RunError> {
    write_file(out_dir, "analysis-hotspots.json", &to_pretty_json(analysis)?)
}

/// Write the scoring table sidecar.
pub fn write_scores(analysis: &ScoringAnalysis, out_dir: &Path) -> Result<String, RunError> {
    write_file(out_dir, "analysis-scores.json", &to_pretty_json(analysis)?)
}
