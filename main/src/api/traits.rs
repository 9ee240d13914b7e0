use std::collections::BTreeMap;
use std::path::Path;

use crate::api::config::RuleConfig;
use crate::api::facts::{ClassFact, FactIndex};
use crate::api::types::{Finding, RuleFailure, RuleId, RunError, Severity};

/// Evaluation context handed to a rule: the frozen fact index, the role
/// assignment, this rule's configuration, and the classes admitted by the
/// engine-applied scope filter. Rules observe, never mutate.
pub struct EvalContext<'a> {
    /// The frozen fact index.
    pub index: &'a FactIndex,
    /// Role assignment: class FQN → role id. At most one role per class.
    pub roles: &'a BTreeMap<String, String>,
    /// The configured rule definition (params, severity, scope).
    pub rule: &'a RuleConfig,
    /// Canonical id of the rule being evaluated.
    pub rule_id: RuleId,
    /// Effective severity for findings of this rule.
    pub severity: Severity,
    /// FQNs admitted by the scope filter, in index order.
    pub in_scope: &'a [String],
}

impl<'a> EvalContext<'a> {
    /// Class facts admitted by the scope filter, in index order.
    pub fn classes_in_scope(&self) -> impl Iterator<Item = &'a ClassFact> + '_ {
        self.in_scope.iter().filter_map(|fqn| self.index.class(fqn))
    }

    /// Role assigned to a class, if any.
    pub fn role_of(&self, fqn: &str) -> Option<&str> {
        self.roles.get(fqn).map(|s| s.as_str())
    }

    /// Start a finding anchored at a class, with rule id, severity, path,
    /// and class FQN pre-filled.
    pub fn finding_for_class(&self, class: &ClassFact, message: impl Into<String>) -> Finding {
        Finding::new(
            self.rule_id.clone(),
            self.severity,
            class.location.origin_path.clone(),
            message,
        )
        .with_class(class.fqn())
    }

    /// Start a project-level finding with no class anchor.
    pub fn finding_for_project(&self, message: impl Into<String>) -> Finding {
        Finding::new(self.rule_id.clone(), self.severity, "", message)
    }
}

/// A rule implementation. Registered under its canonical `<type>.<name>` id;
/// the engine applies scope filtering and crash isolation around `evaluate`.
pub trait Rule: Send + Sync {
    /// Canonical `<type>.<name>` id this implementation answers to.
    fn id(&self) -> RuleId;

    /// Produce findings for the classes in scope. Must be deterministic for
    /// a fixed fact index and rule configuration. A `RuleFailure` (e.g. a
    /// parameter that survived validation but cannot be read) is recorded by
    /// the engine as a rule-crash error; it never aborts the run.
    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure>;
}

/// A report format emitter. Consumes the built report and writes bytes under
/// the output directory; emitters hold no long-lived handles.
pub trait Exporter {
    /// File name this exporter writes (relative to the output directory).
    fn file_name(&self) -> &str;

    /// Serialize the report to bytes. Must be byte-identical for identical
    /// inputs.
    fn render(&self, report: &crate::api::export::ExportedReport) -> Result<Vec<u8>, RunError>;

    /// Write the rendered bytes. The default creates parent directories and
    /// performs a single open-write-close.
    fn emit(&self, report: &crate::api::export::ExportedReport, out_dir: &Path) -> Result<(), RunError> {
        let bytes = self.render(report)?;
        let path = out_dir.join(self.file_name());
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&path, bytes)?;
        Ok(())
    }
}
