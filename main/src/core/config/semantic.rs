use std::collections::BTreeSet;

use chrono::NaiveDate;
use regex::Regex;

use crate::api::config::{PolicyDoc, UnknownRulePolicy};
use crate::api::types::ValidationError;
use crate::core::paths::glob_to_regex;
use crate::core::roles::RoleIndex;
use crate::core::rules::spec::{validate_rule_params, SpecContext};
use crate::core::rules::{CompiledScope, RuleRegistry};

/// Cross-reference and consistency validation over a structurally valid
/// policy. Returns every diagnostic; callers decide whether any blocking
/// error is present.
pub fn validate_semantics(
    policy: &PolicyDoc,
    registry: &RuleRegistry,
    today: NaiveDate,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // Roles: unique ids, compilable matchers.
    let mut role_ids: BTreeSet<String> = BTreeSet::new();
    for (i, role) in policy.roles.iter().enumerate() {
        if !role_ids.insert(role.id.clone()) {
            errors.push(ValidationError::error(
                format!("roles[{}].id", i),
                format!("duplicate role id '{}'", role.id),
            ));
        }
    }
    if let Err(matcher_errors) = RoleIndex::compile(&policy.roles) {
        errors.extend(matcher_errors);
    }

    let rule_ids: BTreeSet<String> = policy.rules.iter().map(|r| r.id.clone()).collect();
    let spec_ctx = SpecContext { role_ids: &role_ids, rule_ids: &rule_ids };

    // Rules: known ids, valid scope references, valid parameters.
    for (i, rule) in policy.rules.iter().enumerate() {
        if !rule.id.contains('.') {
            errors.push(ValidationError::error(
                format!("rules[{}].id", i),
                format!("rule id '{}' is not in <type>.<name> form", rule.id),
            ));
            continue;
        }
        if !registry.contains(&rule.id) {
            match policy.project.validation.unknown_rule {
                UnknownRulePolicy::Error => errors.push(ValidationError::error(
                    format!("rules[{}].id", i),
                    format!("unknown rule id '{}'", rule.id),
                )),
                UnknownRulePolicy::Warn => errors.push(ValidationError::warn(
                    format!("rules[{}].id", i),
                    format!("unknown rule id '{}' (rule will be skipped)", rule.id),
                )),
                UnknownRulePolicy::Ignore => {}
            }
            continue;
        }

        if let Some(roles) = &rule.roles {
            for (j, role) in roles.iter().enumerate() {
                if !role_ids.contains(role) {
                    errors.push(ValidationError::error(
                        format!("rules[{}].roles[{}]", i, j),
                        format!("unknown role id '{}'", role),
                    ));
                }
            }
        }
        if let Some(scope) = &rule.scope {
            for (j, role) in scope.include_roles.iter().enumerate() {
                if !role_ids.contains(role) {
                    errors.push(ValidationError::error(
                        format!("rules[{}].scope.includeRoles[{}]", i, j),
                        format!("unknown role id '{}'", role),
                    ));
                }
            }
            for (j, role) in scope.exclude_roles.iter().enumerate() {
                if !role_ids.contains(role) {
                    errors.push(ValidationError::error(
                        format!("rules[{}].scope.excludeRoles[{}]", i, j),
                        format!("unknown role id '{}'", role),
                    ));
                }
            }
        }
        if let Err(e) = CompiledScope::compile(rule, i) {
            errors.push(e);
        }
        errors.extend(validate_rule_params(i, rule, &spec_ctx));
    }

    // Exceptions: at least one selector, compilable patterns, sane expiry.
    for (i, exception) in policy.exceptions.iter().enumerate() {
        let path = format!("exceptions[{}]", i);
        if !exception.matcher.has_any_selector() {
            errors.push(ValidationError::error(
                format!("{}.match", path),
                "exception declares no selector",
            ));
        }
        let regex_selectors = [
            ("classNameRegex", &exception.matcher.class_name_regex),
            ("packageRegex", &exception.matcher.package_regex),
            ("originPathRegex", &exception.matcher.origin_path_regex),
        ];
        for (key, pattern) in regex_selectors {
            if let Some(pattern) = pattern {
                if let Err(e) = Regex::new(pattern) {
                    errors.push(ValidationError::error(
                        format!("{}.match.{}", path, key),
                        format!("invalid regex '{}': {}", pattern, e),
                    ));
                }
            }
        }
        if let Some(glob) = &exception.matcher.file_glob {
            if glob_to_regex(glob).is_none() {
                errors.push(ValidationError::error(
                    format!("{}.match.fileGlob", path),
                    format!("invalid glob '{}'", glob),
                ));
            }
        }
        if let Some(expires) = &exception.expires_on {
            match NaiveDate::parse_from_str(expires, "%Y-%m-%d") {
                Ok(date) => {
                    if date < today {
                        errors.push(ValidationError::warn(
                            format!("{}.expiresOn", path),
                            format!("exception expired on {} and still applies", date),
                        ));
                    }
                }
                Err(_) => errors.push(ValidationError::error(
                    format!("{}.expiresOn", path),
                    format!("invalid date '{}', expected YYYY-MM-DD", expires),
                )),
            }
        }
        for (j, suppressed) in exception.suppress.iter().enumerate() {
            if !rule_ids.contains(suppressed) {
                errors.push(ValidationError::warn(
                    format!("{}.suppress[{}]", path, j),
                    format!("suppressed rule id '{}' is not configured", suppressed),
                ));
            }
        }
    }

    // Scoring thresholds.
    let scoring = &policy.analysis.scoring;
    if scoring.warning_threshold > scoring.error_threshold {
        errors.push(ValidationError::warn(
            "analysis.scoring.warningThreshold",
            format!(
                "warning threshold {} exceeds error threshold {}",
                scoring.warning_threshold, scoring.error_threshold
            ),
        ));
    }

    errors
}
