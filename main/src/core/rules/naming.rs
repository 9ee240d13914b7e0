use crate::api::traits::{EvalContext, Rule};
use crate::api::types::{Finding, RuleFailure, RuleId};
use crate::core::params::ParamReader;

/// All rules of the `naming` group.
pub fn rules() -> Vec<Box<dyn Rule>> {
    vec![Box::new(BannedSuffixes)]
}

fn name_ends_with(name: &str, suffix: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        name.ends_with(suffix)
    } else {
        name.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase())
    }
}

/// `naming.bannedSuffixes`: class/method/field names must not end with any
/// of the banned suffixes.
pub struct BannedSuffixes;

impl Rule for BannedSuffixes {
    fn id(&self) -> RuleId {
        RuleId::from("naming.bannedSuffixes")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let banned = params.require_string_list("banned", true)?;
        let apply_to = params
            .optional_string("applyTo")?
            .unwrap_or_else(|| "classes".to_string());
        let case_sensitive = params.optional_bool("caseSensitive")?.unwrap_or(true);
        let apply_to_roles = params.optional_string_list("applyToRoles")?.unwrap_or_default();

        let classes = apply_to == "classes" || apply_to == "all";
        let methods = apply_to == "methods" || apply_to == "all";
        let fields = apply_to == "fields" || apply_to == "all";

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            if !apply_to_roles.is_empty() {
                match ctx.role_of(class.fqn()) {
                    Some(role) if apply_to_roles.iter().any(|r| r == role) => {}
                    _ => continue,
                }
            }
            if classes {
                for suffix in &banned {
                    if name_ends_with(class.simple_name(), suffix, case_sensitive) {
                        findings.push(
                            ctx.finding_for_class(
                                class,
                                format!(
                                    "Class name '{}' ends with banned suffix '{}'",
                                    class.simple_name(),
                                    suffix
                                ),
                            )
                            .with_data("target", "class")
                            .with_data("suffix", suffix.clone()),
                        );
                    }
                }
            }
            if methods {
                for method in ctx.index.methods_of(class.fqn()) {
                    if method.is_constructor || method.name.starts_with('<') {
                        continue;
                    }
                    for suffix in &banned {
                        if name_ends_with(&method.name, suffix, case_sensitive) {
                            findings.push(
                                ctx.finding_for_class(
                                    class,
                                    format!(
                                        "Method name '{}' ends with banned suffix '{}'",
                                        method.name, suffix
                                    ),
                                )
                                .with_member(method.name.clone())
                                .with_data("target", "method")
                                .with_data("suffix", suffix.clone()),
                            );
                        }
                    }
                }
            }
            if fields {
                for field in ctx.index.fields_of(class.fqn()) {
                    for suffix in &banned {
                        if name_ends_with(&field.name, suffix, case_sensitive) {
                            findings.push(
                                ctx.finding_for_class(
                                    class,
                                    format!(
                                        "Field name '{}' ends with banned suffix '{}'",
                                        field.name, suffix
                                    ),
                                )
                                .with_member(field.name.clone())
                                .with_data("target", "field")
                                .with_data("suffix", suffix.clone()),
                            );
                        }
                    }
                }
            }
        }
        Ok(findings)
    }
}
