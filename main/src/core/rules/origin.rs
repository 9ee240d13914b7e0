use std::collections::BTreeSet;

use crate::api::traits::{EvalContext, Rule};
use crate::api::types::{Finding, RuleFailure, RuleId};
use crate::core::params::ParamReader;
use crate::core::paths::glob_matches;

/// All rules of the `origin` group.
pub fn rules() -> Vec<Box<dyn Rule>> {
    vec![Box::new(ForbiddenJarDependencies), Box::new(AllowOnlyRoot)]
}

/// `origin.forbiddenJarDependencies`: forbid dependencies on classes that
/// live in archives whose bucket name matches a banned glob.
pub struct ForbiddenJarDependencies;

impl Rule for ForbiddenJarDependencies {
    fn id(&self) -> RuleId {
        RuleId::from("origin.forbiddenJarDependencies")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let forbidden = params.require_string_list("forbidden", true)?;

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            // One finding per (class, bucket) pair.
            let mut reported: BTreeSet<String> = BTreeSet::new();
            for target in ctx.index.outgoing_refs(class.fqn()) {
                let Some(bucket) = ctx.index.external_bucket(&target) else { continue };
                if !forbidden.iter().any(|g| glob_matches(g, bucket)) {
                    continue;
                }
                if reported.insert(bucket.to_string()) {
                    findings.push(
                        ctx.finding_for_class(
                            class,
                            format!("Class depends on forbidden archive '{}'", bucket),
                        )
                        .with_data("bucket", bucket)
                        .with_data("target", target.clone()),
                    );
                }
            }
        }
        Ok(findings)
    }
}

/// `origin.allowOnlyRoot`: external archive dependencies are allowed only
/// when the referenced class lives under the configured root package.
pub struct AllowOnlyRoot;

impl Rule for AllowOnlyRoot {
    fn id(&self) -> RuleId {
        RuleId::from("origin.allowOnlyRoot")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let root = params.require_string("rootPackage")?;
        let root_prefix = format!("{}.", root);

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            let mut reported: BTreeSet<String> = BTreeSet::new();
            for target in ctx.index.outgoing_refs(class.fqn()) {
                let Some(bucket) = ctx.index.external_bucket(&target) else { continue };
                let package = target.rsplit_once('.').map(|(p, _)| p).unwrap_or("");
                if package == root || package.starts_with(&root_prefix) {
                    continue;
                }
                if reported.insert(target.clone()) {
                    findings.push(
                        ctx.finding_for_class(
                            class,
                            format!(
                                "External dependency '{}' (archive '{}') is outside root package '{}'",
                                target, bucket, root
                            ),
                        )
                        .with_data("target", target.clone())
                        .with_data("bucket", bucket)
                        .with_data("root", root.clone()),
                    );
                }
            }
        }
        Ok(findings)
    }
}
