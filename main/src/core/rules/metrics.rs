use std::collections::BTreeSet;

use regex::Regex;

use crate::api::facts::{ClassFact, MethodFact, Visibility};
use crate::api::traits::{EvalContext, Rule};
use crate::api::types::{Finding, RuleFailure, RuleId};
use crate::core::params::{ParamError, ParamReader};

/// All rules of the `metrics` group.
pub fn rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(MaxMethodsByRole),
        Box::new(MaxMethodsPerClass),
        Box::new(MaxFieldsPerClass),
        Box::new(MaxFanIn),
        Box::new(MaxFanOut),
        Box::new(MaxPackageSpread),
    ]
}

/// Which methods a count includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    /// Every declared non-constructor method.
    Declared,
    /// Public non-constructor methods.
    Public,
    /// Private non-constructor methods.
    Private,
}

impl CountKind {
    fn parse(s: &str) -> Option<CountKind> {
        match s.to_ascii_uppercase().as_str() {
            "DECLARED_METHODS" => Some(CountKind::Declared),
            "PUBLIC_METHODS" => Some(CountKind::Public),
            "PRIVATE_METHODS" => Some(CountKind::Private),
            _ => None,
        }
    }

    fn admits(self, method: &MethodFact) -> bool {
        if method.is_constructor || method.name.starts_with('<') {
            return false;
        }
        match self {
            CountKind::Declared => true,
            CountKind::Public => method.visibility() == Visibility::Public,
            CountKind::Private => method.visibility() == Visibility::Private,
        }
    }
}

fn read_count_kinds(params: &ParamReader<'_>, key: &str) -> Result<Vec<CountKind>, ParamError> {
    match params.optional_string_list(key)? {
        None => Ok(vec![CountKind::Declared]),
        Some(names) => {
            let mut kinds = Vec::new();
            for (i, name) in names.iter().enumerate() {
                match CountKind::parse(name) {
                    Some(kind) => kinds.push(kind),
                    None => {
                        return Err(ParamError {
                            path: format!("{}.{}[{}]", params.path(), key, i),
                            message: format!("unknown counting kind '{}'", name),
                        })
                    }
                }
            }
            Ok(kinds)
        }
    }
}

fn read_ignore_regexes(params: &ParamReader<'_>) -> Result<Vec<Regex>, RuleFailure> {
    let patterns = params
        .optional_string_list("ignoreMethodNameRegex")?
        .unwrap_or_default();
    let mut regexes = Vec::new();
    for (i, pattern) in patterns.iter().enumerate() {
        regexes.push(Regex::new(pattern).map_err(|e| {
            RuleFailure::new(format!("{}.ignoreMethodNameRegex[{}]: {}", params.path(), i, e))
        })?);
    }
    Ok(regexes)
}

/// Count methods matching any of `kinds`, after the ignore filter.
fn count_methods(
    ctx: &EvalContext<'_>,
    class: &ClassFact,
    kinds: &[CountKind],
    ignore: &[Regex],
) -> usize {
    ctx.index
        .methods_of(class.fqn())
        .iter()
        .filter(|m| !ignore.iter().any(|re| re.is_match(&m.name)))
        .filter(|m| kinds.iter().any(|k| k.admits(m)))
        .count()
}

/// `metrics.maxMethodsByRole`: per-role method-count caps.
pub struct MaxMethodsByRole;

impl Rule for MaxMethodsByRole {
    fn id(&self) -> RuleId {
        RuleId::from("metrics.maxMethodsByRole")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let limits_reader = params.require_map("limits")?;
        let mut limits: Vec<(String, u64)> = Vec::new();
        for (role, entry) in limits_reader.entries()? {
            let limit = match entry.value() {
                serde_json::Value::Number(_) => limits_reader.require_non_negative_int(&role)?,
                _ => {
                    return Err(RuleFailure::new(format!(
                        "{}: expected an integer limit",
                        entry.path()
                    )))
                }
            };
            limits.push((role, limit));
        }
        let kinds = read_count_kinds(&params, "countKinds")?;
        let ignore = read_ignore_regexes(&params)?;

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            let Some(role) = ctx.role_of(class.fqn()) else { continue };
            let Some((_, max)) = limits.iter().find(|(r, _)| r == role) else { continue };
            let count = count_methods(ctx, class, &kinds, &ignore) as u64;
            if count > *max {
                findings.push(
                    ctx.finding_for_class(
                        class,
                        format!(
                            "Class with role '{}' declares {} methods, limit is {}",
                            role, count, max
                        ),
                    )
                    .with_data("role", role)
                    .with_data("count", count.to_string())
                    .with_data("max", max.to_string()),
                );
            }
        }
        Ok(findings)
    }
}

/// `metrics.maxMethodsPerClass`: one cap for every class in scope.
pub struct MaxMethodsPerClass;

impl Rule for MaxMethodsPerClass {
    fn id(&self) -> RuleId {
        RuleId::from("metrics.maxMethodsPerClass")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let max = params.require_non_negative_int("max")?;
        let kinds = read_count_kinds(&params, "countKinds")?;
        let ignore = read_ignore_regexes(&params)?;

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            let count = count_methods(ctx, class, &kinds, &ignore) as u64;
            if count > max {
                findings.push(
                    ctx.finding_for_class(
                        class,
                        format!("Class declares {} methods, limit is {}", count, max),
                    )
                    .with_data("count", count.to_string())
                    .with_data("max", max.to_string()),
                );
            }
        }
        Ok(findings)
    }
}

/// `metrics.maxFieldsPerClass`: cap on declared fields.
pub struct MaxFieldsPerClass;

impl Rule for MaxFieldsPerClass {
    fn id(&self) -> RuleId {
        RuleId::from("metrics.maxFieldsPerClass")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let max = params.require_non_negative_int("max")?;

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            let count = ctx.index.fields_of(class.fqn()).len() as u64;
            if count > max {
                findings.push(
                    ctx.finding_for_class(
                        class,
                        format!("Class declares {} fields, limit is {}", count, max),
                    )
                    .with_data("count", count.to_string())
                    .with_data("max", max.to_string()),
                );
            }
        }
        Ok(findings)
    }
}

/// Distinct counterpart count for coupling caps. `include_external` admits
/// references outside the project index.
fn coupling(ctx: &EvalContext<'_>, refs: &BTreeSet<String>, include_external: bool) -> u64 {
    refs.iter()
        .filter(|fqn| include_external || ctx.index.contains_class(fqn))
        .count() as u64
}

/// `metrics.maxFanIn`: cap on distinct incoming referrers.
pub struct MaxFanIn;

impl Rule for MaxFanIn {
    fn id(&self) -> RuleId {
        RuleId::from("metrics.maxFanIn")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let max = params.require_non_negative_int("max")?;
        let include_external = params.optional_bool("includeExternal")?.unwrap_or(false);

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            let refs = ctx.index.incoming_refs(class.fqn());
            let count = coupling(ctx, &refs, include_external);
            if count > max {
                findings.push(
                    ctx.finding_for_class(
                        class,
                        format!("Class has fan-in {}, limit is {}", count, max),
                    )
                    .with_data("count", count.to_string())
                    .with_data("max", max.to_string()),
                );
            }
        }
        Ok(findings)
    }
}

/// `metrics.maxFanOut`: cap on distinct outgoing references.
pub struct MaxFanOut;

impl Rule for MaxFanOut {
    fn id(&self) -> RuleId {
        RuleId::from("metrics.maxFanOut")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let max = params.require_non_negative_int("max")?;
        let include_external = params.optional_bool("includeExternal")?.unwrap_or(false);

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            let refs = ctx.index.outgoing_refs(class.fqn());
            let count = coupling(ctx, &refs, include_external);
            if count > max {
                findings.push(
                    ctx.finding_for_class(
                        class,
                        format!("Class has fan-out {}, limit is {}", count, max),
                    )
                    .with_data("count", count.to_string())
                    .with_data("max", max.to_string()),
                );
            }
        }
        Ok(findings)
    }
}

/// `metrics.maxPackageSpread`: cap on distinct packages a class references.
pub struct MaxPackageSpread;

impl Rule for MaxPackageSpread {
    fn id(&self) -> RuleId {
        RuleId::from("metrics.maxPackageSpread")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let max = params.require_non_negative_int("max")?;
        let include_external = params.optional_bool("includeExternal")?.unwrap_or(false);

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            let packages: BTreeSet<String> = ctx
                .index
                .outgoing_refs(class.fqn())
                .iter()
                .filter(|fqn| include_external || ctx.index.contains_class(fqn))
                .filter_map(|fqn| fqn.rsplit_once('.').map(|(p, _)| p.to_string()))
                .filter(|p| p != class.package())
                .collect();
            let count = packages.len() as u64;
            if count > max {
                findings.push(
                    ctx.finding_for_class(
                        class,
                        format!("Class references {} packages, limit is {}", count, max),
                    )
                    .with_data("count", count.to_string())
                    .with_data("max", max.to_string()),
                );
            }
        }
        Ok(findings)
    }
}
