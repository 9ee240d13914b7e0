use regex::Regex;

use crate::api::traits::{EvalContext, Rule};
use crate::api::types::{Finding, RuleFailure, RuleId};
use crate::core::params::ParamReader;

/// All rules of the `api` group.
pub fn rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(ForbiddenAnnotationUsage),
        Box::new(ForbiddenInternalNamePatterns),
        Box::new(MaxPublicTypes),
    ]
}

fn compile_forbid_list(params: &ParamReader<'_>) -> Result<Vec<Regex>, RuleFailure> {
    let patterns = params.require_string_list("forbid", true)?;
    let mut regexes = Vec::new();
    for (i, pattern) in patterns.iter().enumerate() {
        regexes.push(
            Regex::new(pattern)
                .map_err(|e| RuleFailure::new(format!("{}.forbid[{}]: {}", params.path(), i, e)))?,
        );
    }
    Ok(regexes)
}

/// `api.forbiddenAnnotationUsage`: ban annotations by regex over their FQN,
/// internal name, or descriptor form, wherever they appear.
pub struct ForbiddenAnnotationUsage;

fn annotation_matches(regexes: &[Regex], fqn: &str) -> Option<String> {
    let internal = fqn.replace('.', "/");
    let descriptor = format!("L{};", internal);
    for re in regexes {
        if re.is_match(fqn) || re.is_match(&internal) || re.is_match(&descriptor) {
            return Some(re.as_str().to_string());
        }
    }
    None
}

impl Rule for ForbiddenAnnotationUsage {
    fn id(&self) -> RuleId {
        RuleId::from("api.forbiddenAnnotationUsage")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let regexes = compile_forbid_list(&params)?;

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            for annotation in &class.annotations {
                if let Some(pattern) = annotation_matches(&regexes, annotation) {
                    findings.push(
                        ctx.finding_for_class(
                            class,
                            format!("Forbidden annotation '{}' on class", annotation),
                        )
                        .with_data("annotation", annotation.clone())
                        .with_data("pattern", pattern),
                    );
                }
            }
            for method in ctx.index.methods_of(class.fqn()) {
                for annotation in &method.annotations {
                    if let Some(pattern) = annotation_matches(&regexes, annotation) {
                        findings.push(
                            ctx.finding_for_class(
                                class,
                                format!(
                                    "Forbidden annotation '{}' on method '{}'",
                                    annotation, method.name
                                ),
                            )
                            .with_member(method.name.clone())
                            .with_data("annotation", annotation.clone())
                            .with_data("pattern", pattern),
                        );
                    }
                }
            }
            for field in ctx.index.fields_of(class.fqn()) {
                for annotation in &field.annotations {
                    if let Some(pattern) = annotation_matches(&regexes, annotation) {
                        findings.push(
                            ctx.finding_for_class(
                                class,
                                format!(
                                    "Forbidden annotation '{}' on field '{}'",
                                    annotation, field.name
                                ),
                            )
                            .with_member(field.name.clone())
                            .with_data("annotation", annotation.clone())
                            .with_data("pattern", pattern),
                        );
                    }
                }
            }
        }
        Ok(findings)
    }
}

/// `api.forbiddenInternalNamePatterns`: public classes must not match any of
/// the banned internal-name patterns.
pub struct ForbiddenInternalNamePatterns;

impl Rule for ForbiddenInternalNamePatterns {
    fn id(&self) -> RuleId {
        RuleId::from("api.forbiddenInternalNamePatterns")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let regexes = compile_forbid_list(&params)?;

        let mut findings = Vec::new();
        for class in ctx.classes_in_scope() {
            if !class.is_public() {
                continue;
            }
            for re in &regexes {
                if re.is_match(&class.type_ref.internal) {
                    findings.push(
                        ctx.finding_for_class(
                            class,
                            format!(
                                "Public type '{}' matches forbidden pattern '{}'",
                                class.type_ref.internal,
                                re.as_str()
                            ),
                        )
                        .with_data("pattern", re.as_str()),
                    );
                }
            }
        }
        Ok(findings)
    }
}

/// `api.maxPublicTypes`: cap on public types in scope. Emits one
/// project-level finding when the cap is exceeded.
pub struct MaxPublicTypes;

impl Rule for MaxPublicTypes {
    fn id(&self) -> RuleId {
        RuleId::from("api.maxPublicTypes")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let max = params.require_non_negative_int("max")?;

        let count = ctx.classes_in_scope().filter(|c| c.is_public()).count() as u64;
        if count > max {
            return Ok(vec![ctx
                .finding_for_project(format!("Project exposes {} public types, limit is {}", count, max))
                .with_data("count", count.to_string())
                .with_data("max", max.to_string())]);
        }
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::facts::FactIndex;
    use crate::core::rules::tests_support::{class, ctx_for, method, rule_with_params};
    use serde_json::json;
    use std::collections::{BTreeMap, BTreeSet};

    fn eval<R: Rule>(rule: &R, index: &FactIndex, params: serde_json::Value) -> Vec<Finding> {
        let config = rule_with_params(rule.id().as_str(), params);
        let (roles, in_scope) = ctx_for(index);
        let ctx = EvalContext {
            index,
            roles: &roles,
            rule: &config,
            rule_id: rule.id(),
            severity: config.severity,
            in_scope: &in_scope,
        };
        rule.evaluate(&ctx).unwrap()
    }

    #[test]
    fn test_forbidden_annotation_on_class_and_method() {
        let mut c = class("p/A");
        c.annotations.insert("com.sun.istack.Nullable".to_string());
        let mut m = method("p.A", "work");
        m.annotations.insert("com.sun.istack.NotNull".to_string());
        let index = FactIndex::build(
            vec![c],
            vec![m],
            vec![],
            vec![],
            BTreeSet::new(),
            BTreeMap::new(),
        );
        let findings = eval(&ForbiddenAnnotationUsage, &index, json!({"forbid": ["^com\\.sun\\."]}));
        assert_eq!(findings.len(), 2);
        assert!(findings.iter().any(|f| f.member.as_deref() == Some("work")));
    }

    #[test]
    fn test_annotation_matches_descriptor_form() {
        let mut c = class("p/A");
        c.annotations.insert("javax.annotation.Generated".to_string());
        let index = FactIndex::build(
            vec![c],
            vec![],
            vec![],
            vec![],
            BTreeSet::new(),
            BTreeMap::new(),
        );
        // Pattern written against the descriptor form still hits.
        let findings = eval(
            &ForbiddenAnnotationUsage,
            &index,
            json!({"forbid": ["^Ljavax/annotation/Generated;$"]}),
        );
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn test_forbidden_internal_name_only_public() {
        let mut hidden = class("p/internal/Hidden");
        hidden.access = 0;
        let index = FactIndex::build(
            vec![class("p/internal/Exposed"), hidden],
            vec![],
            vec![],
            vec![],
            BTreeSet::new(),
            BTreeMap::new(),
        );
        let findings = eval(
            &ForbiddenInternalNamePatterns,
            &index,
            json!({"forbid": ["/internal/"]}),
        );
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].class_fqn.as_deref(), Some("p.internal.Exposed"));
    }

    #[test]
    fn test_max_public_types() {
        let index = FactIndex::build(
            vec![class("p/A"), class("p/B")],
            vec![],
            vec![],
            vec![],
            BTreeSet::new(),
            BTreeMap::new(),
        );
        let findings = eval(&MaxPublicTypes, &index, json!({"max": 1}));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].file_path, "");
        assert_eq!(findings[0].data["count"], "2");
        assert!(eval(&MaxPublicTypes, &index, json!({"max": 2})).is_empty());
    }
}
