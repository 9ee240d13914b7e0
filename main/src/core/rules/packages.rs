use regex::Regex;

use crate::api::traits::{EvalContext, Rule};
use crate::api::types::{Finding, RuleFailure, RuleId};
use crate::core::params::ParamReader;

/// All rules of the `packages` group.
pub fn rules() -> Vec<Box<dyn Rule>> {
    vec![Box::new(RolePlacement), Box::new(RootPackage)]
}

/// `packages.rolePlacement`: classes holding a role must live under that
/// role's expected package pattern.
pub struct RolePlacement;

impl Rule for RolePlacement {
    fn id(&self) -> RuleId {
        RuleId::from("packages.rolePlacement")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let expected = params.require_map("expected")?;

        let mut placements: Vec<(String, Regex)> = Vec::new();
        for (role, entry) in expected.entries()? {
            let pattern = entry.require_string("packageRegex")?;
            let re = Regex::new(&pattern)
                .map_err(|e| RuleFailure::new(format!("{}.packageRegex: {}", entry.path(), e)))?;
            placements.push((role, re));
        }

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            let Some(role) = ctx.role_of(class.fqn()) else { continue };
            let Some((_, re)) = placements.iter().find(|(r, _)| r == role) else { continue };
            if !re.is_match(class.package()) {
                findings.push(
                    ctx.finding_for_class(
                        class,
                        format!(
                            "Class with role '{}' lives in package '{}', expected pattern '{}'",
                            role,
                            class.package(),
                            re.as_str()
                        ),
                    )
                    .with_data("role", role)
                    .with_data("package", class.package())
                    .with_data("expected", re.as_str()),
                );
            }
        }
        Ok(findings)
    }
}

/// `packages.rootPackage`: enforce a single root package, either derived
/// (AUTO) or configured (EXPLICIT).
pub struct RootPackage;

/// Longest common dot-segment prefix over package names.
fn common_package_prefix<'a>(packages: impl Iterator<Item = &'a str>) -> String {
    let mut prefix: Option<Vec<&str>> = None;
    for package in packages {
        let segments: Vec<&str> = if package.is_empty() {
            vec![]
        } else {
            package.split('.').collect()
        };
        prefix = Some(match prefix {
            None => segments,
            Some(current) => {
                let mut keep = 0;
                while keep < current.len() && keep < segments.len() && current[keep] == segments[keep] {
                    keep += 1;
                }
                current[..keep].to_vec()
            }
        });
    }
    prefix.unwrap_or_default().join(".")
}

fn under_root(package: &str, root: &str) -> bool {
    package == root || package.starts_with(&format!("{}.", root))
}

impl Rule for RootPackage {
    fn id(&self) -> RuleId {
        RuleId::from("packages.rootPackage")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let mode = params
            .require_enum(
                "mode",
                |s| match s.to_ascii_uppercase().as_str() {
                    "AUTO" => Some("AUTO"),
                    "EXPLICIT" => Some("EXPLICIT"),
                    _ => None,
                },
                "AUTO|EXPLICIT",
            )?
            .to_string();

        let mut findings = Vec::new();
        match mode.as_str() {
            "AUTO" => {
                let classes: Vec<_> = ctx.classes_in_scope().collect();
                if classes.is_empty() {
                    return Ok(findings);
                }
                let root = common_package_prefix(classes.iter().map(|c| c.package()));
                if root.is_empty() {
                    let mut roots: Vec<String> = classes
                        .iter()
                        .map(|c| c.package().split('.').next().unwrap_or("").to_string())
                        .collect();
                    roots.sort();
                    roots.dedup();
                    findings.push(
                        ctx.finding_for_project(format!(
                            "No single root package: found {} distinct roots",
                            roots.len()
                        ))
                        .with_data("roots", roots.join(","))
                        .with_data("count", roots.len().to_string()),
                    );
                }
            }
            _ => {
                let root = params.require_string("value")?;
                for class in ctx.classes_in_scope() {
                    if !under_root(class.package(), &root) {
                        findings.push(
                            ctx.finding_for_class(
                                class,
                                format!(
                                    "Class is outside the root package '{}' (found '{}')",
                                    root,
                                    class.package()
                                ),
                            )
                            .with_data("root", root.clone())
                            .with_data("package", class.package()),
                        );
                    }
                }
            }
        }
        Ok(findings)
    }
}
