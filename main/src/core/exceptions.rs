use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;

use crate::api::config::ExceptionConfig;
use crate::api::types::{Finding, ValidationError};
use crate::core::paths::glob_matches;

/// One exception with its patterns compiled. Expiry is checked at validation
/// time only; an expired exception keeps suppressing at runtime.
pub struct CompiledException {
    rule_id: Option<String>,
    rule_type: Option<String>,
    rule_name: Option<String>,
    roles: Vec<String>,
    class_internal: Option<String>,
    class_regex: Option<Regex>,
    package_regex: Option<Regex>,
    origin_regex: Option<Regex>,
    file_glob: Option<String>,
    suppress: BTreeSet<String>,
}

/// Compile every exception. Errors carry `exceptions[i].match…` paths; the
/// semantic validator reports the same failures earlier, so a validated
/// policy always compiles.
pub fn compile_exceptions(
    configs: &[ExceptionConfig],
) -> Result<Vec<CompiledException>, Vec<ValidationError>> {
    let mut compiled = Vec::with_capacity(configs.len());
    let mut errors = Vec::new();
    for (i, config) in configs.iter().enumerate() {
        let mut regex = |pattern: &Option<String>, key: &str| -> Option<Regex> {
            pattern.as_ref().and_then(|p| match Regex::new(p) {
                Ok(re) => Some(re),
                Err(e) => {
                    errors.push(ValidationError::error(
                        format!("exceptions[{}].match.{}", i, key),
                        format!("invalid regex '{}': {}", p, e),
                    ));
                    None
                }
            })
        };
        let matcher = &config.matcher;
        compiled.push(CompiledException {
            rule_id: matcher.rule_id.clone(),
            rule_type: matcher.rule_type.clone(),
            rule_name: matcher.rule_name.clone(),
            roles: matcher.roles.clone(),
            class_internal: matcher.class_internal_name.clone(),
            class_regex: regex(&matcher.class_name_regex, "classNameRegex"),
            package_regex: regex(&matcher.package_regex, "packageRegex"),
            origin_regex: regex(&matcher.origin_path_regex, "originPathRegex"),
            file_glob: matcher.file_glob.clone(),
            suppress: config.suppress.iter().cloned().collect(),
        });
    }
    if errors.is_empty() {
        Ok(compiled)
    } else {
        Err(errors)
    }
}

impl CompiledException {
    /// A finding is suppressed iff every declared selector matches and the
    /// suppressed set admits its rule (empty set = every rule).
    pub fn suppresses(&self, finding: &Finding, roles: &BTreeMap<String, String>) -> bool {
        if let Some(rule_id) = &self.rule_id {
            if finding.rule_id.as_str() != rule_id {
                return false;
            }
        }
        if let Some(rule_type) = &self.rule_type {
            if finding.rule_id.rule_type() != rule_type {
                return false;
            }
        }
        if let Some(rule_name) = &self.rule_name {
            if finding.rule_id.rule_name() != rule_name {
                return false;
            }
        }
        if !self.roles.is_empty() {
            let Some(class) = &finding.class_fqn else { return false };
            let Some(role) = roles.get(class) else { return false };
            if !self.roles.iter().any(|r| r == role) {
                return false;
            }
        }
        if let Some(internal) = &self.class_internal {
            let Some(class) = &finding.class_fqn else { return false };
            if class.replace('.', "/") != internal.replace('.', "/") {
                return false;
            }
        }
        if let Some(re) = &self.class_regex {
            let Some(class) = &finding.class_fqn else { return false };
            if !re.is_match(class) {
                return false;
            }
        }
        if let Some(re) = &self.package_regex {
            let Some(class) = &finding.class_fqn else { return false };
            let package = class.rsplit_once('.').map(|(p, _)| p).unwrap_or("");
            if !re.is_match(package) {
                return false;
            }
        }
        if let Some(re) = &self.origin_regex {
            if !re.is_match(&finding.file_path) {
                return false;
            }
        }
        if let Some(glob) = &self.file_glob {
            if !glob_matches(glob, &finding.file_path) {
                return false;
            }
        }
        self.suppress.is_empty() || self.suppress.contains(finding.rule_id.as_str())
    }
}

/// Drop every finding some exception suppresses. Returns the survivors and
/// the suppressed count.
pub fn apply_exceptions(
    findings: Vec<Finding>,
    exceptions: &[CompiledException],
    roles: &BTreeMap<String, String>,
) -> (Vec<Finding>, usize) {
    let before = findings.len();
    let kept: Vec<Finding> = findings
        .into_iter()
        .filter(|f| !exceptions.iter().any(|e| e.suppresses(f, roles)))
        .collect();
    let suppressed = before - kept.len();
    (kept, suppressed)
}
