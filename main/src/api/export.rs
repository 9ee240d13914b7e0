use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::api::types::{EngineError, EngineSummary, Severity};

/// One finding in export form: project-relative path, fingerprint computed,
/// optional fields null-coalesced. Field order here is the canonical JSON
/// field order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedFinding {
    /// Canonical `<type>.<name>` rule id.
    pub rule_id: String,
    /// Severity of the finding.
    pub severity: Severity,
    /// Human-readable message. Not covered by the fingerprint.
    pub message: String,
    /// Project-relative normalized path.
    pub file_path: String,
    /// Class FQN, empty when the finding is not class-anchored.
    pub class_fqn: String,
    /// Member name, empty when the finding is not member-anchored.
    pub member: String,
    /// Start offset, null when absent.
    pub start: Option<u32>,
    /// End offset, null when absent.
    pub end: Option<u32>,
    /// v1 fingerprint (sha-256 hex).
    pub fingerprint: String,
    /// Machine-readable details in rule-emitted order.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub data: IndexMap<String, String>,
}

/// The built report consumed by every exporter. Findings are already
/// suppressed (exceptions, baseline) and sorted by the export total order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedReport {
    /// Report schema version.
    pub version: u32,
    /// Producing tool name.
    pub tool: String,
    /// Producing tool version.
    pub tool_version: String,
    /// ISO-UTC generation timestamp, injected by the caller.
    pub generated_at: String,
    /// Normalized project root the paths are relative to.
    pub project_root: String,
    /// Aggregate counters for the run.
    pub summary: EngineSummary,
    /// Suppressed-and-sorted findings.
    pub findings: Vec<ExportedFinding>,
    /// Engine errors recorded during the run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<EngineError>,
}
