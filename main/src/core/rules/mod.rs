use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, warn};

use crate::api::config::{PolicyDoc, RuleConfig};
use crate::api::facts::{ClassFact, FactIndex};
use crate::api::traits::{EvalContext, Rule};
use crate::api::types::{EngineError, Finding, RuleId, ValidationError};
use crate::core::paths::glob_matches;

mod apisurface;
mod arch;
mod deadcode;
mod graphrules;
mod metrics;
mod naming;
mod origin;
mod packages;
pub mod spec;

/// Registry mapping canonical rule ids to implementations: the built-in set
/// plus registered extensions.
pub struct RuleRegistry {
    rules: BTreeMap<String, Box<dyn Rule>>,
}

impl RuleRegistry {
    /// A registry with every built-in rule.
    pub fn builtin() -> Self {
        let mut registry = RuleRegistry { rules: BTreeMap::new() };
        for rule in naming::rules() {
            registry.register(rule);
        }
        for rule in packages::rules() {
            registry.register(rule);
        }
        for rule in arch::rules() {
            registry.register(rule);
        }
        for rule in metrics::rules() {
            registry.register(rule);
        }
        for rule in deadcode::rules() {
            registry.register(rule);
        }
        for rule in apisurface::rules() {
            registry.register(rule);
        }
        for rule in graphrules::rules() {
            registry.register(rule);
        }
        for rule in origin::rules() {
            registry.register(rule);
        }
        registry
    }

    /// Register an implementation under its canonical id. Later registrations
    /// replace earlier ones.
    pub fn register(&mut self, rule: Box<dyn Rule>) {
        self.rules.insert(rule.id().0.clone(), rule);
    }

    /// Look up an implementation.
    pub fn get(&self, id: &str) -> Option<&dyn Rule> {
        self.rules.get(id).map(|r| r.as_ref())
    }

    /// Whether an id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.rules.contains_key(id)
    }

    /// Registered ids, ascending.
    pub fn ids(&self) -> Vec<&str> {
        self.rules.keys().map(|k| k.as_str()).collect()
    }
}

/// A rule's compiled scope filter. Applied by the engine, never by rules.
#[derive(Debug)]
pub struct CompiledScope {
    roles: Option<Vec<String>>,
    include_roles: Vec<String>,
    exclude_roles: Vec<String>,
    include_packages: Vec<Regex>,
    exclude_packages: Vec<Regex>,
    include_globs: Vec<String>,
    exclude_globs: Vec<String>,
}

impl CompiledScope {
    /// Compile the scope of one configured rule. Errors carry
    /// `rules[i].scope…` paths.
    pub fn compile(rule: &RuleConfig, rule_index: usize) -> Result<CompiledScope, ValidationError> {
        let compile_regexes = |patterns: &[String], key: &str| -> Result<Vec<Regex>, ValidationError> {
            patterns
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    Regex::new(p).map_err(|e| {
                        ValidationError::error(
                            format!("rules[{}].scope.{}[{}]", rule_index, key, i),
                            format!("invalid regex '{}': {}", p, e),
                        )
                    })
                })
                .collect()
        };

        let scope = rule.scope.clone().unwrap_or_default();
        Ok(CompiledScope {
            roles: rule.roles.clone(),
            include_roles: scope.include_roles,
            exclude_roles: scope.exclude_roles,
            include_packages: compile_regexes(&scope.include_packages, "includePackages")?,
            exclude_packages: compile_regexes(&scope.exclude_packages, "excludePackages")?,
            include_globs: scope.include_globs,
            exclude_globs: scope.exclude_globs,
        })
    }

    /// Whether a class is admitted. The top-level role list and the scope's
    /// role filters are conjoined, so scope can only narrow.
    pub fn admits(&self, class: &ClassFact, role: Option<&str>) -> bool {
        if let Some(roles) = &self.roles {
            match role {
                Some(r) if roles.iter().any(|x| x == r) => {}
                _ => return false,
            }
        }
        if !self.include_roles.is_empty() {
            match role {
                Some(r) if self.include_roles.iter().any(|x| x == r) => {}
                _ => return false,
            }
        }
        if let Some(r) = role {
            if self.exclude_roles.iter().any(|x| x == r) {
                return false;
            }
        }
        let package = class.package();
        if !self.include_packages.is_empty()
            && !self.include_packages.iter().any(|re| re.is_match(package))
        {
            return false;
        }
        if self.exclude_packages.iter().any(|re| re.is_match(package)) {
            return false;
        }
        let path = &class.location.origin_path;
        if !self.include_globs.is_empty()
            && !self.include_globs.iter().any(|g| glob_matches(g, path))
        {
            return false;
        }
        if self.exclude_globs.iter().any(|g| glob_matches(g, path)) {
            return false;
        }
        true
    }
}

/// One rule ready to run: implementation, configuration, and resolved scope.
pub struct PlannedRule<'a> {
    /// Canonical id.
    pub rule_id: RuleId,
    /// Implementation from the registry.
    pub rule: &'a dyn Rule,
    /// The policy entry.
    pub config: &'a RuleConfig,
    /// FQNs admitted by the scope filter, in index order.
    pub in_scope: Vec<String>,
}

/// Resolve the rule plan: enabled, known rules with their admitted classes.
/// Unknown rules are skipped here; the semantic validator has already applied
/// the `unknownRule` policy to them.
pub fn plan_rules<'a>(
    registry: &'a RuleRegistry,
    policy: &'a PolicyDoc,
    index: &FactIndex,
    roles: &BTreeMap<String, String>,
) -> Result<Vec<PlannedRule<'a>>, Vec<ValidationError>> {
    let mut planned = Vec::new();
    let mut errors = Vec::new();
    for (i, config) in policy.rules.iter().enumerate() {
        if !config.enabled {
            continue;
        }
        let Some(rule) = registry.get(&config.id) else {
            debug!(rule = %config.id, "unknown rule skipped");
            continue;
        };
        let scope = match CompiledScope::compile(config, i) {
            Ok(s) => s,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        let in_scope: Vec<String> = index
            .classes
            .iter()
            .filter(|c| scope.admits(c, roles.get(c.fqn()).map(String::as_str)))
            .map(|c| c.fqn().to_string())
            .collect();
        planned.push(PlannedRule {
            rule_id: RuleId(config.id.clone()),
            rule,
            config,
            in_scope,
        });
    }
    if errors.is_empty() {
        Ok(planned)
    } else {
        Err(errors)
    }
}

/// Evaluate every planned rule against the frozen index. Rule crashes are
/// recorded as `rule:crash` engine errors; the run continues. Findings come
/// back in rule plan order (their final order is the export sort).
pub fn evaluate_rules(
    planned: &[PlannedRule<'_>],
    index: &FactIndex,
    roles: &BTreeMap<String, String>,
    parallel: bool,
) -> (Vec<Finding>, Vec<EngineError>) {
    let run_one = |p: &PlannedRule<'_>| -> (Vec<Finding>, Option<EngineError>) {
        let ctx = EvalContext {
            index,
            roles,
            rule: p.config,
            rule_id: p.rule_id.clone(),
            severity: p.config.severity,
            in_scope: &p.in_scope,
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| p.rule.evaluate(&ctx)));
        match outcome {
            Ok(Ok(findings)) => (findings, None),
            Ok(Err(failure)) => (
                vec![],
                Some(EngineError {
                    rule_id: Some(p.rule_id.clone()),
                    phase: "rule:crash".to_string(),
                    message: failure.message,
                }),
            ),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "rule panicked".to_string());
                (
                    vec![],
                    Some(EngineError {
                        rule_id: Some(p.rule_id.clone()),
                        phase: "rule:crash".to_string(),
                        message,
                    }),
                )
            }
        }
    };

    let results: Vec<(Vec<Finding>, Option<EngineError>)> = if parallel {
        planned.par_iter().map(run_one).collect()
    } else {
        planned.iter().map(run_one).collect()
    };

    let mut findings = Vec::new();
    let mut errors = Vec::new();
    for (rule_findings, error) in results {
        findings.extend(rule_findings);
        if let Some(e) = error {
            warn!(rule = %e.rule_id.as_ref().map(|r| r.as_str()).unwrap_or("?"), "rule crashed");
            errors.push(e);
        }
    }
    (findings, errors)
}

#[cfg(test)]
pub(crate) mod tests_support {
    use std::collections::{BTreeMap, BTreeSet};

    use serde_json::Value;

    use crate::api::config::RuleConfig;
    use crate::api::facts::{
        ClassFact, DependencyEdge, DependencyKind, FactIndex, FieldFact, MethodFact, OriginKind,
        SourceLocation, TypeRef,
    };
    use crate::api::types::Severity;

    pub fn loc(path: &str) -> SourceLocation {
        SourceLocation {
            kind: OriginKind::DirectoryClass,
            origin_path: path.to_string(),
            container_path: None,
            entry_path: None,
            source_file: None,
            line: None,
        }
    }

    pub fn class(internal: &str) -> ClassFact {
        ClassFact {
            type_ref: TypeRef::from_internal_name(internal),
            access: 0x0001,
            super_type: Some(TypeRef::from_internal_name("java/lang/Object")),
            interfaces: vec![],
            annotations: BTreeSet::new(),
            has_main_method: false,
            location: loc(&format!("out/{}.class", internal)),
        }
    }

    pub fn method(owner: &str, name: &str) -> MethodFact {
        MethodFact {
            owner_fqn: owner.to_string(),
            name: name.to_string(),
            descriptor: "()V".to_string(),
            signature: None,
            access: 0x0001,
            is_constructor: name == "<init>",
            return_type: None,
            param_types: vec![],
            throws: vec![],
            annotations: BTreeSet::new(),
        }
    }

    pub fn field(owner: &str, name: &str, access: u16) -> FieldFact {
        FieldFact {
            owner_fqn: owner.to_string(),
            name: name.to_string(),
            descriptor: "I".to_string(),
            signature: None,
            access,
            field_type: None,
            annotations: BTreeSet::new(),
        }
    }

    pub fn edge(from_internal: &str, to_internal: &str, kind: DependencyKind) -> DependencyEdge {
        DependencyEdge {
            from_fqn: from_internal.replace('/', "."),
            to: TypeRef::from_internal_name(to_internal),
            kind,
            detail: None,
            location: loc(&format!("out/{}.class", from_internal)),
        }
    }

    pub fn index_with(internals: Vec<&str>) -> FactIndex {
        FactIndex::build(
            internals.into_iter().map(class).collect(),
            vec![],
            vec![],
            vec![],
            BTreeSet::new(),
            BTreeMap::new(),
        )
    }

    pub fn rule_with_params(id: &str, params: Value) -> RuleConfig {
        RuleConfig {
            id: id.to_string(),
            enabled: true,
            severity: Severity::Error,
            roles: None,
            scope: None,
            params,
        }
    }

    /// Empty role map plus an in-scope list admitting every class.
    pub fn ctx_for(index: &FactIndex) -> (BTreeMap<String, String>, Vec<String>) {
        let in_scope = index.classes.iter().map(|c| c.fqn().to_string()).collect();
        (BTreeMap::new(), in_scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::facts::{OriginKind, SourceLocation, TypeRef};
    use crate::api::types::{RuleFailure, Severity};
    use serde_json::json;
    use std::collections::BTreeSet;

    fn class(internal: &str) -> ClassFact {
        ClassFact {
            type_ref: TypeRef::from_internal_name(internal),
            access: 0x0001,
            super_type: None,
            interfaces: vec![],
            annotations: BTreeSet::new(),
            has_main_method: false,
            location: SourceLocation {
                kind: OriginKind::DirectoryClass,
                origin_path: format!("out/{}.class", internal),
                container_path: None,
                entry_path: None,
                source_file: None,
                line: None,
            },
        }
    }

    fn rule_config(id: &str) -> RuleConfig {
        RuleConfig {
            id: id.to_string(),
            enabled: true,
            severity: Severity::Error,
            roles: None,
            scope: None,
            params: json!({}),
        }
    }

    #[test]
    fn test_builtin_registry_complete() {
        let registry = RuleRegistry::builtin();
        let expected = [
            "naming.bannedSuffixes",
            "packages.rolePlacement",
            "packages.rootPackage",
            "arch.forbiddenRoleDependencies",
            "arch.allowedRoleDependencies",
            "arch.forbiddenPackages",
            "arch.allowedPackages",
            "metrics.maxMethodsByRole",
            "metrics.maxMethodsPerClass",
            "metrics.maxFieldsPerClass",
            "metrics.maxFanIn",
            "metrics.maxFanOut",
            "metrics.maxPackageSpread",
            "deadcode.unusedPrivateMembers",
            "api.forbiddenAnnotationUsage",
            "api.forbiddenInternalNamePatterns",
            "api.maxPublicTypes",
            "graph.noCycles",
            "graph.maxCycles",
            "graph.maxEdgeCount",
            "graph.maxDependencyDensity",
            "origin.forbiddenJarDependencies",
            "origin.allowOnlyRoot",
        ];
        for id in expected {
            assert!(registry.contains(id), "missing builtin rule {}", id);
        }
        assert_eq!(registry.ids().len(), expected.len());
    }

    #[test]
    fn test_scope_roles_conjunction_never_widens() {
        let mut config = rule_config("naming.bannedSuffixes");
        config.roles = Some(vec!["controller".to_string()]);
        config.scope = Some(crate::api::config::ScopeConfig {
            include_roles: vec!["controller".to_string(), "service".to_string()],
            ..Default::default()
        });
        let scope = CompiledScope::compile(&config, 0).unwrap();
        let c = class("com/a/X");
        // service is in includeRoles but not in the top-level roles list.
        assert!(!scope.admits(&c, Some("service")));
        assert!(scope.admits(&c, Some("controller")));
        assert!(!scope.admits(&c, None));
    }

    #[test]
    fn test_scope_package_and_glob_filters() {
        let mut config = rule_config("naming.bannedSuffixes");
        config.scope = Some(crate::api::config::ScopeConfig {
            include_packages: vec!["^com\\.a".to_string()],
            exclude_globs: vec!["out/com/a/Excluded.class".to_string()],
            ..Default::default()
        });
        let scope = CompiledScope::compile(&config, 0).unwrap();
        assert!(scope.admits(&class("com/a/Kept"), None));
        assert!(!scope.admits(&class("com/b/Other"), None));
        assert!(!scope.admits(&class("com/a/Excluded"), None));
    }

    #[test]
    fn test_scope_invalid_regex_path() {
        let mut config = rule_config("naming.bannedSuffixes");
        config.scope = Some(crate::api::config::ScopeConfig {
            exclude_packages: vec!["(".to_string()],
            ..Default::default()
        });
        let err = CompiledScope::compile(&config, 3).unwrap_err();
        assert_eq!(err.path, "rules[3].scope.excludePackages[0]");
    }

    struct PanickingRule;
    impl Rule for PanickingRule {
        fn id(&self) -> RuleId {
            RuleId::from("test.panics")
        }
        fn evaluate(&self, _ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
            panic!("boom");
        }
    }

    #[test]
    fn test_rule_crash_is_isolated() {
        let mut registry = RuleRegistry::builtin();
        registry.register(Box::new(PanickingRule));
        let config = rule_config("test.panics");
        let index = FactIndex::build(
            vec![class("com/a/X")],
            vec![],
            vec![],
            vec![],
            BTreeSet::new(),
            Default::default(),
        );
        let roles = BTreeMap::new();
        let planned = vec![PlannedRule {
            rule_id: RuleId::from("test.panics"),
            rule: registry.get("test.panics").unwrap(),
            config: &config,
            in_scope: vec!["com.a.X".to_string()],
        }];
        let (findings, errors) = evaluate_rules(&planned, &index, &roles, false);
        assert!(findings.is_empty());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].phase, "rule:crash");
        assert_eq!(errors[0].message, "boom");
    }

    #[test]
    fn test_rules_do_not_mutate_index() {
        let registry = RuleRegistry::builtin();
        let policy: PolicyDoc = serde_yaml::from_str(
            r#"
version: 1
project:
  bytecodeRoots: ["out"]
rules:
  - id: metrics.maxFieldsPerClass
    params:
      max: 0
"#,
        )
        .unwrap();
        let index = FactIndex::build(
            vec![class("com/a/X")],
            vec![],
            vec![],
            vec![],
            BTreeSet::new(),
            Default::default(),
        );
        let roles = BTreeMap::new();
        let before = index.clone();
        let planned = plan_rules(&registry, &policy, &index, &roles).unwrap();
        let _ = evaluate_rules(&planned, &index, &roles, true);
        assert_eq!(index, before);
    }
}
