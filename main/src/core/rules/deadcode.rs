use regex::Regex;

use crate::api::facts::{access, Visibility};
use crate::api::traits::{EvalContext, Rule};
use crate::api::types::{Finding, RuleFailure, RuleId};
use crate::core::params::ParamReader;

/// All rules of the `deadcode` group.
pub fn rules() -> Vec<Box<dyn Rule>> {
    vec![Box::new(UnusedPrivateMembers)]
}

/// `deadcode.unusedPrivateMembers`: report private fields and methods (and
/// optionally non-public classes) that nothing references.
///
/// Member references are tracked at extraction time, including intra-class
/// references, so a private helper called from its own class is not dead.
pub struct UnusedPrivateMembers;

impl Rule for UnusedPrivateMembers {
    fn id(&self) -> RuleId {
        RuleId::from("deadcode.unusedPrivateMembers")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let (check_fields, check_methods, check_classes) = match params.optional_map("check")? {
            Some(check) => (
                check.optional_bool("fields")?.unwrap_or(true),
                check.optional_bool("methods")?.unwrap_or(true),
                check.optional_bool("classes")?.unwrap_or(false),
            ),
            None => (true, true, false),
        };
        let ignore_annotated = params
            .optional_string_list("ignoreAnnotatedWith")?
            .unwrap_or_default();
        let ignore_patterns = params.optional_string_list("ignoreNameRegex")?.unwrap_or_default();
        let mut ignore_regexes = Vec::new();
        for (i, pattern) in ignore_patterns.iter().enumerate() {
            ignore_regexes.push(Regex::new(pattern).map_err(|e| {
                RuleFailure::new(format!("params.ignoreNameRegex[{}]: {}", i, e))
            })?);
        }

        let ignored_name = |name: &str| ignore_regexes.iter().any(|re| re.is_match(name));
        let ignored_annotations = |annotations: &std::collections::BTreeSet<String>| {
            annotations.iter().any(|a| ignore_annotated.iter().any(|i| i == a))
        };

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            if check_fields {
                for field in ctx.index.fields_of(class.fqn()) {
                    if field.visibility() != Visibility::Private
                        || field.access & access::SYNTHETIC != 0
                        || field.name == "serialVersionUID"
                        || ignored_name(&field.name)
                        || ignored_annotations(&field.annotations)
                    {
                        continue;
                    }
                    if !ctx.index.is_member_referenced(class.fqn(), &field.name) {
                        findings.push(
                            ctx.finding_for_class(
                                class,
                                format!("Private field '{}' is never used", field.name),
                            )
                            .with_member(field.name.clone())
                            .with_data("memberName", field.name.clone())
                            .with_data("memberKind", "field"),
                        );
                    }
                }
            }
            if check_methods {
                for method in ctx.index.methods_of(class.fqn()) {
                    if method.visibility() != Visibility::Private
                        || method.is_constructor
                        || method.name.starts_with('<')
                        || method.is_synthetic()
                        || ignored_name(&method.name)
                        || ignored_annotations(&method.annotations)
                    {
                        continue;
                    }
                    if !ctx.index.is_member_referenced(class.fqn(), &method.name) {
                        findings.push(
                            ctx.finding_for_class(
                                class,
                                format!("Private method '{}' is never used", method.name),
                            )
                            .with_member(method.name.clone())
                            .with_data("memberName", method.name.clone())
                            .with_data("memberKind", "method"),
                        );
                    }
                }
            }
            if check_classes {
                let non_public = class.access & (access::PUBLIC | access::PROTECTED) == 0;
                if non_public
                    && !class.is_synthetic()
                    && !class.has_main_method
                    && !ignored_name(class.simple_name())
                    && !ignored_annotations(&class.annotations)
                    && ctx.index.incoming_refs(class.fqn()).is_empty()
                {
                    findings.push(
                        ctx.finding_for_class(
                            class,
                            format!("Class '{}' is never referenced", class.fqn()),
                        )
                        .with_data("memberKind", "class"),
                    );
                }
            }
        }
        Ok(findings)
    }
}
