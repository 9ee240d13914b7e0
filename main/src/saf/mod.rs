use std::path::Path;

use crate::core::engine;
use crate::core::reporter::{JsonReporter, TextReporter};

// Re-export the public surface.
pub use crate::api::config::{
    AnalysisConfig, BaselineConfig, BaselineMode, ExceptionConfig, ExceptionMatch, ExportConfig,
    Granularity, HotspotsConfig, MatcherConfig, PolicyDoc, ProjectConfig, ReportFormatKind,
    RoleConfig, RuleConfig, ScanLimits, ScanScope, ScopeConfig, ScoringConfig, SidecarKind,
    UnknownRulePolicy, ValidationPolicy,
};
pub use crate::api::export::{ExportedFinding, ExportedReport};
pub use crate::api::facts::{
    ClassFact, DependencyEdge, DependencyKind, FactIndex, FieldFact, MethodFact, OriginKind,
    SourceLocation, TypeRef, Visibility,
};
pub use crate::api::traits::{EvalContext, Exporter, Rule};
pub use crate::api::types::{
    ConsoleFormat, EngineError, EngineResult, EngineSummary, ExportOutcome, FactsError, Finding,
    RuleFailure, RuleId, RunError, Severity, ValidationError, ValidationSeverity,
};
pub use crate::core::baseline::{fingerprint, BaselineStore};
pub use crate::core::engine::{run_with_registry, EngineConfig};
pub use crate::core::facts::scanner::CancelToken;
pub use crate::core::rules::RuleRegistry;

/// Run the engine over a project root using the policy found there.
///
/// Equivalent to calling [`run_with_config`] with [`EngineConfig::new`].
pub fn run(root: &Path) -> Result<EngineResult, RunError> {
    run_with_config(&EngineConfig::new(root), &CancelToken::new())
}

/// Run the engine with explicit configuration and a cancellation token.
pub fn run_with_config(
    config: &EngineConfig,
    cancel: &CancelToken,
) -> Result<EngineResult, RunError> {
    engine::run(config, cancel)
}

/// Validate the policy of a project without extracting facts.
///
/// Returns every diagnostic, warnings included.
pub fn validate_policy(config: &EngineConfig) -> Result<Vec<ValidationError>, RunError> {
    engine::validate_only(config)
}

/// Format an engine result as human-readable text, findings grouped by rule.
pub fn format_result_text(result: &EngineResult) -> String {
    TextReporter.report(result)
}

/// Format an engine result as pretty-printed JSON.
pub fn format_result_json(result: &EngineResult) -> String {
    JsonReporter.report(result)
}
