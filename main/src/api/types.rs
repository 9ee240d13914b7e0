use std::fmt;
use std::io;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers and severities
// ---------------------------------------------------------------------------

/// Canonical rule identifier in `<type>.<name>` form (e.g. `arch.forbiddenRoleDependencies`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RuleId(pub String);

impl RuleId {
    /// Build a canonical id from its two halves.
    pub fn new(rule_type: &str, rule_name: &str) -> Self {
        RuleId(format!("{}.{}", rule_type, rule_name))
    }

    /// The `<type>` half, i.e. everything before the first dot.
    pub fn rule_type(&self) -> &str {
        self.0.split_once('.').map(|(t, _)| t).unwrap_or(&self.0)
    }

    /// The `<name>` half, i.e. everything after the first dot.
    pub fn rule_name(&self) -> &str {
        self.0.split_once('.').map(|(_, n)| n).unwrap_or("")
    }

    /// Borrow the canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RuleId {
    fn from(s: &str) -> Self {
        RuleId(s.to_string())
    }
}

/// Severity level of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A blocking error that must be fixed before release.
    Error,
    /// A non-blocking issue that should be addressed.
    Warning,
    /// An informational note with no gating impact.
    Info,
}

impl Severity {
    /// Sort rank: error < warning < info.
    pub fn rank(self) -> u8 {
        match self {
            Severity::Error => 0,
            Severity::Warning => 1,
            Severity::Info => 2,
        }
    }

    /// Canonical uppercase name, used by fingerprints and the policy format.
    pub fn canonical_name(self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }

    /// Case-tolerant parse (`error`, `ERROR`, `Error` all accepted).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ERROR" => Some(Severity::Error),
            "WARNING" | "WARN" => Some(Severity::Warning),
            "INFO" => Some(Severity::Info),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_name())
    }
}

// ---------------------------------------------------------------------------
// Findings
// ---------------------------------------------------------------------------

/// A single rule violation report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// The canonical id of the rule that produced this finding.
    pub rule_id: RuleId,
    /// Human-readable description of the violation. Never part of the fingerprint.
    pub message: String,
    /// Severity level of this finding.
    pub severity: Severity,
    /// Normalized, project-relative path of the offending origin.
    pub file_path: String,
    /// Fully-qualified name of the offending class, if the finding targets one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_fqn: Option<String>,
    /// Member (method or field) name, if the finding targets one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<String>,
    /// Optional start offset within the origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u32>,
    /// Optional end offset within the origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u32>,
    /// Ordered machine-readable key/value details; covered by the fingerprint.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub data: IndexMap<String, String>,
}

impl Finding {
    /// Minimal constructor; optional fields start empty.
    pub fn new(
        rule_id: RuleId,
        severity: Severity,
        file_path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Finding {
            rule_id,
            message: message.into(),
            severity,
            file_path: file_path.into(),
            class_fqn: None,
            member: None,
            start: None,
            end: None,
            data: IndexMap::new(),
        }
    }

    /// Attach the offending class.
    pub fn with_class(mut self, fqn: impl Into<String>) -> Self {
        self.class_fqn = Some(fqn.into());
        self
    }

    /// Attach the offending member.
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    /// Append a data entry, preserving insertion order.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Structured error records
// ---------------------------------------------------------------------------

/// Severity of a validation diagnostic. `Warn` never blocks a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSeverity {
    /// The policy cannot be used; the run aborts before extraction.
    Error,
    /// The policy is usable; the diagnostic is reported and the run continues.
    Warn,
}

/// A diagnostic emitted by the schema or semantic validators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Dotted path into the policy document (e.g. `rules[2].params.max`).
    pub path: String,
    /// What is wrong at that path.
    pub message: String,
    /// Whether this diagnostic blocks the run.
    pub severity: ValidationSeverity,
}

impl ValidationError {
    /// Blocking diagnostic at `path`.
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError {
            path: path.into(),
            message: message.into(),
            severity: ValidationSeverity::Error,
        }
    }

    /// Non-blocking diagnostic at `path`.
    pub fn warn(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError {
            path: path.into(),
            message: message.into(),
            severity: ValidationSeverity::Warn,
        }
    }
}

/// A per-class extraction failure. Recorded, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactsError {
    /// Identity of the origin that failed (path or archive entry).
    pub origin_id: String,
    /// Extraction phase that failed (e.g. `read`, `parse`, `extract`).
    pub phase: String,
    /// What went wrong.
    pub message: String,
    /// Underlying error kind, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// A runtime failure inside one rule evaluation. The engine records it as a
/// rule-crash `EngineError` and continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFailure {
    /// What went wrong.
    pub message: String,
}

impl RuleFailure {
    /// Build a failure from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        RuleFailure { message: message.into() }
    }
}

impl fmt::Display for RuleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// An engine-level failure: a crashed rule, a breached scan limit, a failed export.
///
/// The run continues past these; `EngineResult::is_success` reports false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineError {
    /// The rule involved, when the failure is rule-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<RuleId>,
    /// Pipeline phase (e.g. `rule:crash`, `scan:limit`, `export:io`).
    pub phase: String,
    /// What went wrong.
    pub message: String,
}

/// Fatal failure of a run: bad input path, unreadable policy, blocking
/// validation errors, or cancellation. Everything else is recorded in the
/// result instead of surfacing here.
#[derive(Debug)]
pub enum RunError {
    /// An I/O error on the only input or output path.
    Io(io::Error),
    /// The supplied project path is invalid or does not exist.
    Path(String),
    /// The policy document could not be located, read, or parsed.
    Config(String),
    /// The policy failed validation with at least one blocking error.
    Validation(Vec<ValidationError>),
    /// The run was cancelled via the cooperative cancellation token.
    Canceled,
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::Io(e) => write!(f, "IO error: {}", e),
            RunError::Path(s) => write!(f, "Path error: {}", s),
            RunError::Config(s) => write!(f, "Config error: {}", s),
            RunError::Validation(errors) => {
                let blocking = errors
                    .iter()
                    .filter(|e| e.severity == ValidationSeverity::Error)
                    .count();
                write!(f, "Policy validation failed with {} error(s)", blocking)?;
                for e in errors
                    .iter()
                    .filter(|e| e.severity == ValidationSeverity::Error)
                    .take(5)
                {
                    write!(f, "\n  {}: {}", e.path, e.message)?;
                }
                Ok(())
            }
            RunError::Canceled => write!(f, "Run cancelled"),
        }
    }
}

impl std::error::Error for RunError {}

impl From<io::Error> for RunError {
    fn from(e: io::Error) -> Self {
        RunError::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Engine result
// ---------------------------------------------------------------------------

/// Aggregate counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSummary {
    /// Number of classes in the fact index.
    pub classes: usize,
    /// Number of declared methods in the fact index.
    pub methods: usize,
    /// Number of declared fields in the fact index.
    pub fields: usize,
    /// Number of dependency edges in the fact index.
    pub edges: usize,
    /// Number of external archive buckets admitted to the index.
    pub external_buckets: usize,
    /// Exported findings by severity: `[errors, warnings, infos]`.
    pub findings_by_severity: [usize; 3],
    /// Findings removed by exception suppression.
    pub suppressed_by_exceptions: usize,
    /// Findings removed by baseline suppression.
    pub suppressed_by_baseline: usize,
    /// Per-class extraction failures, in discovery order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facts_errors: Vec<FactsError>,
}

/// Paths of the report files written by the export stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOutcome {
    /// Output directory the bundle was written under.
    pub output_dir: String,
    /// Files written, relative to the output directory, in write order.
    pub written: Vec<String>,
}

/// The outcome of a full engine run.
#[derive(Debug)]
pub struct EngineResult {
    /// Aggregate counters.
    pub summary: EngineSummary,
    /// Findings after exception and baseline suppression, export-sorted.
    pub findings: Vec<Finding>,
    /// Engine errors recorded during the run.
    pub errors: Vec<EngineError>,
    /// Export outcome, when the export stage ran.
    pub export: Option<ExportOutcome>,
    /// Non-blocking validation diagnostics gathered before the run.
    pub validation_warnings: Vec<ValidationError>,
}

impl EngineResult {
    /// True iff no engine errors were recorded. Findings are expected output,
    /// not failures.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Console output format selection, mirrored from the report sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleFormat {
    /// Human-readable plain text grouped by rule.
    Text,
    /// Pretty-printed JSON (serde_json).
    Json,
}
