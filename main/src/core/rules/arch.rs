use std::collections::BTreeSet;

use regex::Regex;

use crate::api::facts::DependencyKind;
use crate::api::traits::{EvalContext, Rule};
use crate::api::types::{Finding, RuleFailure, RuleId};
use crate::core::params::{ParamError, ParamReader};

/// All rules of the `arch` group.
pub fn rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(ForbiddenRoleDependencies),
        Box::new(AllowedRoleDependencies),
        Box::new(ForbiddenPackages),
        Box::new(AllowedPackages),
    ]
}

/// Read the optional `kinds` list; absent means every kind.
fn read_kinds(params: &ParamReader<'_>) -> Result<BTreeSet<DependencyKind>, ParamError> {
    match params.optional_string_list("kinds")? {
        None => Ok(DependencyKind::all().iter().copied().collect()),
        Some(names) => {
            let mut kinds = BTreeSet::new();
            for (i, name) in names.iter().enumerate() {
                match DependencyKind::parse(name) {
                    Some(kind) => {
                        kinds.insert(kind);
                    }
                    None => {
                        return Err(ParamError {
                            path: format!("{}.kinds[{}]", params.path(), i),
                            message: format!("unknown dependency kind '{}'", name),
                        })
                    }
                }
            }
            Ok(kinds)
        }
    }
}

struct RolePair {
    from: String,
    to: Vec<String>,
    message: Option<String>,
}

fn read_role_pairs(params: &ParamReader<'_>, key: &str) -> Result<Vec<RolePair>, ParamError> {
    let mut pairs = Vec::new();
    for entry in params.require_list(key)? {
        pairs.push(RolePair {
            from: entry.require_string("from")?,
            to: entry.require_string_list("to", true)?,
            message: entry.optional_string("message")?,
        });
    }
    Ok(pairs)
}

/// `arch.forbiddenRoleDependencies`: forbid role→role dependency edges.
pub struct ForbiddenRoleDependencies;

impl Rule for ForbiddenRoleDependencies {
    fn id(&self) -> RuleId {
        RuleId::from("arch.forbiddenRoleDependencies")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let kinds = read_kinds(&params)?;
        let pairs = read_role_pairs(&params, "forbidden")?;

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            let Some(from_role) = ctx.role_of(class.fqn()) else { continue };
            let applicable: Vec<&RolePair> =
                pairs.iter().filter(|p| p.from == from_role).collect();
            if applicable.is_empty() {
                continue;
            }
            // One finding per forbidden target class, independent of how many
            // edges reach it.
            let mut reported: BTreeSet<&str> = BTreeSet::new();
            for edge in &ctx.index.edges {
                if edge.from_fqn != class.fqn() || !kinds.contains(&edge.kind) {
                    continue;
                }
                let Some(to_role) = ctx.role_of(&edge.to.fqn) else { continue };
                for pair in &applicable {
                    if pair.to.iter().any(|r| r == to_role) && reported.insert(&edge.to.fqn) {
                        let message = pair.message.clone().unwrap_or_else(|| {
                            format!(
                                "Role '{}' must not depend on role '{}' ({} -> {})",
                                from_role, to_role, edge.from_fqn, edge.to.fqn
                            )
                        });
                        findings.push(
                            ctx.finding_for_class(class, message)
                                .with_data("fromRole", from_role)
                                .with_data("toRole", to_role)
                                .with_data("target", edge.to.fqn.clone())
                                .with_data("kind", edge.kind.canonical_name()),
                        );
                    }
                }
            }
        }
        Ok(findings)
    }
}

/// `arch.allowedRoleDependencies`: whitelist role→role dependency edges.
/// Roles absent from the allow list are unconstrained.
pub struct AllowedRoleDependencies;

impl Rule for AllowedRoleDependencies {
    fn id(&self) -> RuleId {
        RuleId::from("arch.allowedRoleDependencies")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let kinds = read_kinds(&params)?;
        let pairs = read_role_pairs(&params, "allowed")?;

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            let Some(from_role) = ctx.role_of(class.fqn()) else { continue };
            let allowed: Vec<&RolePair> = pairs.iter().filter(|p| p.from == from_role).collect();
            if allowed.is_empty() {
                continue;
            }
            let mut reported: BTreeSet<&str> = BTreeSet::new();
            for edge in &ctx.index.edges {
                if edge.from_fqn != class.fqn() || !kinds.contains(&edge.kind) {
                    continue;
                }
                let Some(to_role) = ctx.role_of(&edge.to.fqn) else { continue };
                if to_role == from_role {
                    continue;
                }
                let permitted = allowed
                    .iter()
                    .any(|p| p.to.iter().any(|r| r == to_role));
                if !permitted && reported.insert(&edge.to.fqn) {
                    findings.push(
                        ctx.finding_for_class(
                            class,
                            format!(
                                "Role '{}' may not depend on role '{}' ({} -> {})",
                                from_role, to_role, edge.from_fqn, edge.to.fqn
                            ),
                        )
                        .with_data("fromRole", from_role)
                        .with_data("toRole", to_role)
                        .with_data("target", edge.to.fqn.clone())
                        .with_data("kind", edge.kind.canonical_name()),
                    );
                }
            }
        }
        Ok(findings)
    }
}

struct PackagePair {
    from: Regex,
    to: Vec<Regex>,
    message: Option<String>,
}

fn read_package_pairs(params: &ParamReader<'_>, key: &str) -> Result<Vec<PackagePair>, RuleFailure> {
    let mut pairs = Vec::new();
    for entry in params.require_list(key)? {
        let from_pattern = entry.require_string("from")?;
        let from = Regex::new(&from_pattern)
            .map_err(|e| RuleFailure::new(format!("{}.from: {}", entry.path(), e)))?;
        let mut to = Vec::new();
        for (i, pattern) in entry.require_string_list("to", true)?.iter().enumerate() {
            to.push(
                Regex::new(pattern)
                    .map_err(|e| RuleFailure::new(format!("{}.to[{}]: {}", entry.path(), i, e)))?,
            );
        }
        pairs.push(PackagePair { from, to, message: entry.optional_string("message")? });
    }
    Ok(pairs)
}

/// `arch.forbiddenPackages`: forbid package→package dependency edges.
pub struct ForbiddenPackages;

impl Rule for ForbiddenPackages {
    fn id(&self) -> RuleId {
        RuleId::from("arch.forbiddenPackages")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let kinds = read_kinds(&params)?;
        let pairs = read_package_pairs(&params, "forbidden")?;

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            let from_package = class.package();
            let applicable: Vec<&PackagePair> =
                pairs.iter().filter(|p| p.from.is_match(from_package)).collect();
            if applicable.is_empty() {
                continue;
            }
            let mut reported: BTreeSet<&str> = BTreeSet::new();
            for edge in &ctx.index.edges {
                if edge.from_fqn != class.fqn() || !kinds.contains(&edge.kind) {
                    continue;
                }
                let to_package = &edge.to.package;
                if to_package == from_package {
                    continue;
                }
                for pair in &applicable {
                    if pair.to.iter().any(|re| re.is_match(to_package))
                        && reported.insert(&edge.to.fqn)
                    {
                        let message = pair.message.clone().unwrap_or_else(|| {
                            format!(
                                "Package '{}' must not depend on package '{}' ({} -> {})",
                                from_package, to_package, edge.from_fqn, edge.to.fqn
                            )
                        });
                        findings.push(
                            ctx.finding_for_class(class, message)
                                .with_data("fromPackage", from_package)
                                .with_data("toPackage", to_package.clone())
                                .with_data("target", edge.to.fqn.clone()),
                        );
                    }
                }
            }
        }
        Ok(findings)
    }
}

/// `arch.allowedPackages`: whitelist package→package dependency edges.
/// Packages matching no `from` pattern are unconstrained; intra-package
/// edges are always allowed.
pub struct AllowedPackages;

impl Rule for AllowedPackages {
    fn id(&self) -> RuleId {
        RuleId::from("arch.allowedPackages")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let kinds = read_kinds(&params)?;
        let pairs = read_package_pairs(&params, "allowed")?;

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            let from_package = class.package();
            let applicable: Vec<&PackagePair> =
                pairs.iter().filter(|p| p.from.is_match(from_package)).collect();
            if applicable.is_empty() {
                continue;
            }
            let mut reported: BTreeSet<&str> = BTreeSet::new();
            for edge in &ctx.index.edges {
                if edge.from_fqn != class.fqn() || !kinds.contains(&edge.kind) {
                    continue;
                }
                let to_package = &edge.to.package;
                if to_package == from_package {
                    continue;
                }
                let permitted = applicable
                    .iter()
                    .any(|p| p.to.iter().any(|re| re.is_match(to_package)));
                if !permitted && reported.insert(&edge.to.fqn) {
                    findings.push(
                        ctx.finding_for_class(
                            class,
                            format!(
                                "Package '{}' may not depend on package '{}' ({} -> {})",
                                from_package, to_package, edge.from_fqn, edge.to.fqn
                            ),
                        )
                        .with_data("fromPackage", from_package)
                        .with_data("toPackage", to_package.clone())
                        .with_data("target", edge.to.fqn.clone()),
                    );
                }
            }
        }
        Ok(findings)
    }
}
