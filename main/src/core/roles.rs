use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};

use crate::api::config::{MatcherConfig, RoleConfig};
use crate::api::facts::{ClassFact, FactIndex};
use crate::api::types::ValidationError;

/// A compiled matcher node. Regexes are compiled once; evaluation is pure.
#[derive(Debug)]
pub enum CompiledMatcher {
    /// True if any child matches.
    AnyOf(Vec<CompiledMatcher>),
    /// True if all children match.
    AllOf(Vec<CompiledMatcher>),
    /// Negation.
    Not(Box<CompiledMatcher>),
    /// Regex over the package name.
    PackageRegex(Regex),
    /// Whole dot-delimited package segment.
    PackageContainsSegment { segment: String, case_sensitive: bool },
    /// Regex over the simple class name.
    ClassNameRegex(Regex),
    /// Simple-name suffix.
    ClassNameEndsWith { suffix: String, case_sensitive: bool },
    /// Any of several simple-name suffixes.
    ClassNameEndsWithAny { suffixes: Vec<String>, case_sensitive: bool },
    /// Exact annotation FQN on the class.
    Annotation(String),
    /// Annotation FQN prefix on the class.
    AnnotationPrefix(String),
    /// Directly implemented interface FQN.
    Implements(String),
    /// Direct superclass FQN.
    Extends(String),
    /// Main-method presence.
    HasMainMethod(bool),
}

fn ends_with(name: &str, suffix: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        name.ends_with(suffix)
    } else {
        name.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase())
    }
}

impl CompiledMatcher {
    /// Evaluate against one class fact.
    pub fn matches(&self, class: &ClassFact) -> bool {
        match self {
            CompiledMatcher::AnyOf(children) => children.iter().any(|m| m.matches(class)),
            CompiledMatcher::AllOf(children) => children.iter().all(|m| m.matches(class)),
            CompiledMatcher::Not(inner) => !inner.matches(class),
            CompiledMatcher::PackageRegex(re) => re.is_match(class.package()),
            CompiledMatcher::PackageContainsSegment { segment, case_sensitive } => {
                class.package().split('.').any(|s| {
                    if *case_sensitive {
                        s == segment
                    } else {
                        s.eq_ignore_ascii_case(segment)
                    }
                })
            }
            CompiledMatcher::ClassNameRegex(re) => re.is_match(class.simple_name()),
            CompiledMatcher::ClassNameEndsWith { suffix, case_sensitive } => {
                ends_with(class.simple_name(), suffix, *case_sensitive)
            }
            CompiledMatcher::ClassNameEndsWithAny { suffixes, case_sensitive } => suffixes
                .iter()
                .any(|s| ends_with(class.simple_name(), s, *case_sensitive)),
            CompiledMatcher::Annotation(fqn) => class.annotations.contains(fqn),
            CompiledMatcher::AnnotationPrefix(prefix) => {
                class.annotations.iter().any(|a| a.starts_with(prefix))
            }
            CompiledMatcher::Implements(fqn) => {
                class.interfaces.iter().any(|i| i.fqn == *fqn)
            }
            CompiledMatcher::Extends(fqn) => {
                class.super_type.as_ref().map(|s| s.fqn == *fqn).unwrap_or(false)
            }
            CompiledMatcher::HasMainMethod(expected) => class.has_main_method == *expected,
        }
    }
}

fn compile_regex(pattern: &str, case_sensitive: bool, path: &str) -> Result<Regex, ValidationError> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| ValidationError::error(path, format!("invalid regex '{}': {}", pattern, e)))
}

fn normalize_fqn(name: &str) -> String {
    name.replace('/', ".")
}

/// Compile one matcher node. Exactly one selector must be set;
/// `caseSensitive` is inherited by children unless overridden.
pub fn compile_matcher(
    config: &MatcherConfig,
    inherited_case_sensitive: bool,
    path: &str,
) -> Result<CompiledMatcher, ValidationError> {
    let case_sensitive = config.case_sensitive.unwrap_or(inherited_case_sensitive);

    let mut selectors: Vec<&str> = Vec::new();
    if config.any_of.is_some() {
        selectors.push("anyOf");
    }
    if config.all_of.is_some() {
        selectors.push("allOf");
    }
    if config.not.is_some() {
        selectors.push("not");
    }
    if config.package_regex.is_some() {
        selectors.push("packageRegex");
    }
    if config.package_contains_segment.is_some() {
        selectors.push("packageContainsSegment");
    }
    if config.class_name_regex.is_some() {
        selectors.push("classNameRegex");
    }
    if config.class_name_ends_with.is_some() {
        selectors.push("classNameEndsWith");
    }
    if config.class_name_ends_with_any.is_some() {
        selectors.push("classNameEndsWithAny");
    }
    if config.annotation.is_some() {
        selectors.push("annotation");
    }
    if config.annotation_prefix.is_some() {
        selectors.push("annotationPrefix");
    }
    if config.implements.is_some() {
        selectors.push("implements");
    }
    if config.extends.is_some() {
        selectors.push("extends");
    }
    if config.has_main_method.is_some() {
        selectors.push("hasMainMethod");
    }

    match selectors.len() {
        0 => return Err(ValidationError::error(path, "matcher declares no selector")),
        1 => {}
        _ => {
            return Err(ValidationError::error(
                path,
                format!("matcher declares multiple selectors: {}", selectors.join(", ")),
            ))
        }
    }

    if let Some(children) = &config.any_of {
        let compiled = compile_children(children, case_sensitive, path, "anyOf")?;
        return Ok(CompiledMatcher::AnyOf(compiled));
    }
    if let Some(children) = &config.all_of {
        let compiled = compile_children(children, case_sensitive, path, "allOf")?;
        return Ok(CompiledMatcher::AllOf(compiled));
    }
    if let Some(inner) = &config.not {
        let compiled = compile_matcher(inner, case_sensitive, &format!("{}.not", path))?;
        return Ok(CompiledMatcher::Not(Box::new(compiled)));
    }
    if let Some(pattern) = &config.package_regex {
        let re = compile_regex(pattern, case_sensitive, &format!("{}.packageRegex", path))?;
        return Ok(CompiledMatcher::PackageRegex(re));
    }
    if let Some(segment) = &config.package_contains_segment {
        return Ok(CompiledMatcher::PackageContainsSegment {
            segment: segment.clone(),
            case_sensitive,
        });
    }
    if let Some(pattern) = &config.class_name_regex {
        let re = compile_regex(pattern, case_sensitive, &format!("{}.classNameRegex", path))?;
        return Ok(CompiledMatcher::ClassNameRegex(re));
    }
    if let Some(suffix) = &config.class_name_ends_with {
        return Ok(CompiledMatcher::ClassNameEndsWith { suffix: suffix.clone(), case_sensitive });
    }
    if let Some(suffixes) = &config.class_name_ends_with_any {
        if suffixes.is_empty() {
            return Err(ValidationError::error(
                format!("{}.classNameEndsWithAny", path),
                "list must not be empty",
            ));
        }
        return Ok(CompiledMatcher::ClassNameEndsWithAny {
            suffixes: suffixes.clone(),
            case_sensitive,
        });
    }
    if let Some(fqn) = &config.annotation {
        return Ok(CompiledMatcher::Annotation(normalize_fqn(fqn)));
    }
    if let Some(prefix) = &config.annotation_prefix {
        return Ok(CompiledMatcher::AnnotationPrefix(normalize_fqn(prefix)));
    }
    if let Some(fqn) = &config.implements {
        return Ok(CompiledMatcher::Implements(normalize_fqn(fqn)));
    }
    if let Some(fqn) = &config.extends {
        return Ok(CompiledMatcher::Extends(normalize_fqn(fqn)));
    }
    if let Some(expected) = config.has_main_method {
        return Ok(CompiledMatcher::HasMainMethod(expected));
    }
    unreachable!("selector count checked above")
}

fn compile_children(
    children: &[MatcherConfig],
    case_sensitive: bool,
    path: &str,
    key: &str,
) -> Result<Vec<CompiledMatcher>, ValidationError> {
    if children.is_empty() {
        return Err(ValidationError::error(
            format!("{}.{}", path, key),
            "list must not be empty",
        ));
    }
    children
        .iter()
        .enumerate()
        .map(|(i, c)| compile_matcher(c, case_sensitive, &format!("{}.{}[{}]", path, key, i)))
        .collect()
}

/// One role with its compiled matcher.
#[derive(Debug)]
pub struct CompiledRole {
    /// Role id.
    pub id: String,
    /// Priority; higher wins.
    pub priority: i32,
    /// The compiled matcher.
    pub matcher: CompiledMatcher,
}

/// All roles, ordered for assignment: descending priority, then ascending id.
#[derive(Debug, Default)]
pub struct RoleIndex {
    roles: Vec<CompiledRole>,
}

impl RoleIndex {
    /// Compile every role matcher. Errors carry `roles[i].match…` paths.
    pub fn compile(configs: &[RoleConfig]) -> Result<RoleIndex, Vec<ValidationError>> {
        let mut roles = Vec::with_capacity(configs.len());
        let mut errors = Vec::new();
        for (i, config) in configs.iter().enumerate() {
            let path = format!("roles[{}].match", i);
            match compile_matcher(&config.matcher, true, &path) {
                Ok(matcher) => roles.push(CompiledRole {
                    id: config.id.clone(),
                    priority: config.priority,
                    matcher,
                }),
                Err(e) => errors.push(e),
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        roles.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(RoleIndex { roles })
    }

    /// Roles in assignment order.
    pub fn roles(&self) -> &[CompiledRole] {
        &self.roles
    }

    /// First matching role for one class, if any.
    pub fn role_for(&self, class: &ClassFact) -> Option<&str> {
        self.roles
            .iter()
            .find(|r| r.matcher.matches(class))
            .map(|r| r.id.as_str())
    }

    /// Resolve roles for every class in the index. At most one role per
    /// class; deterministic across runs.
    pub fn assign(&self, index: &FactIndex) -> BTreeMap<String, String> {
        let mut assignments = BTreeMap::new();
        for class in &index.classes {
            if let Some(role) = self.role_for(class) {
                assignments.insert(class.fqn().to_string(), role.to_string());
            }
        }
        assignments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::facts::{OriginKind, SourceLocation, TypeRef};
    use std::collections::BTreeSet;

    fn class(fqn_internal: &str) -> ClassFact {
        ClassFact {
            type_ref: TypeRef::from_internal_name(fqn_internal),
            access: 0x0001,
            super_type: Some(TypeRef::from_internal_name("java/lang/Object")),
            interfaces: vec![],
            annotations: BTreeSet::new(),
            has_main_method: false,
            location: SourceLocation {
                kind: OriginKind::DirectoryClass,
                origin_path: format!("out/{}.class", fqn_internal),
                container_path: None,
                entry_path: None,
                source_file: None,
                line: None,
            },
        }
    }

    fn matcher_yaml(yaml: &str) -> MatcherConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_ends_with_matcher() {
        let m = compile_matcher(&matcher_yaml("classNameEndsWith: Controller"), true, "m").unwrap();
        assert!(m.matches(&class("com/a/AdminController")));
        assert!(!m.matches(&class("com/a/AdminService")));
    }

    #[test]
    fn test_ends_with_case_insensitive() {
        let m = compile_matcher(
            &matcher_yaml("classNameEndsWith: controller\ncaseSensitive: false"),
            true,
            "m",
        )
        .unwrap();
        assert!(m.matches(&class("com/a/AdminController")));
    }

    #[test]
    fn test_package_contains_segment_whole_segments_only() {
        let m = compile_matcher(&matcher_yaml("packageContainsSegment: service"), true, "m").unwrap();
        assert!(m.matches(&class("a/service/b/X")));
        assert!(!m.matches(&class("a/serviceimpl/X")));
    }

    #[test]
    fn test_any_of_and_not() {
        let m = compile_matcher(
            &matcher_yaml(
                "anyOf:\n  - classNameEndsWith: Repo\n  - not:\n      packageRegex: '^com\\.a'",
            ),
            true,
            "m",
        )
        .unwrap();
        assert!(m.matches(&class("com/a/UserRepo")));
        assert!(m.matches(&class("org/x/Thing")));
        assert!(!m.matches(&class("com/a/Thing")));
    }

    #[test]
    fn test_implements_and_extends() {
        let mut c = class("com/a/JobRunner");
        c.interfaces.push(TypeRef::from_internal_name("java/lang/Runnable"));
        let implements =
            compile_matcher(&matcher_yaml("implements: java.lang.Runnable"), true, "m").unwrap();
        assert!(implements.matches(&c));
        let extends =
            compile_matcher(&matcher_yaml("extends: java.lang.Object"), true, "m").unwrap();
        assert!(extends.matches(&c));
    }

    #[test]
    fn test_annotation_prefix() {
        let mut c = class("com/a/X");
        c.annotations.insert("org.springframework.stereotype.Service".to_string());
        let m = compile_matcher(
            &matcher_yaml("annotationPrefix: org.springframework"),
            true,
            "m",
        )
        .unwrap();
        assert!(m.matches(&c));
    }

    #[test]
    fn test_no_selector_rejected() {
        let err = compile_matcher(&MatcherConfig::default(), true, "roles[0].match").unwrap_err();
        assert_eq!(err.path, "roles[0].match");
        assert!(err.message.contains("no selector"));
    }

    #[test]
    fn test_multiple_selectors_rejected() {
        let config = matcher_yaml("classNameEndsWith: A\npackageRegex: x");
        let err = compile_matcher(&config, true, "m").unwrap_err();
        assert!(err.message.contains("multiple selectors"));
    }

    #[test]
    fn test_invalid_regex_carries_path() {
        let config = matcher_yaml("classNameRegex: '('");
        let err = compile_matcher(&config, true, "roles[2].match").unwrap_err();
        assert_eq!(err.path, "roles[2].match.classNameRegex");
    }

    fn role(id: &str, priority: i32, yaml: &str) -> RoleConfig {
        RoleConfig {
            id: id.to_string(),
            priority,
            description: None,
            matcher: matcher_yaml(yaml),
        }
    }

    #[test]
    fn test_priority_then_id_order() {
        let roles = vec![
            role("zeta", 5, "classNameEndsWith: X"),
            role("alpha", 5, "classNameEndsWith: X"),
            role("low", 1, "classNameEndsWith: X"),
        ];
        let index = RoleIndex::compile(&roles).unwrap();
        let ids: Vec<&str> = index.roles().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "zeta", "low"]);
        assert_eq!(index.role_for(&class("com/a/BoxX")), Some("alpha"));
    }

    #[test]
    fn test_at_most_one_role() {
        let roles = vec![
            role("controller", 10, "classNameEndsWith: Controller"),
            role("repository", 5, "classNameEndsWith: Repository"),
        ];
        let role_index = RoleIndex::compile(&roles).unwrap();
        let facts = FactIndex::build(
            vec![class("com/a/AdminController"), class("com/a/UserRepository"), class("com/a/Util")],
            vec![],
            vec![],
            vec![],
            BTreeSet::new(),
            Default::default(),
        );
        let assigned = role_index.assign(&facts);
        assert_eq!(assigned.get("com.a.AdminController").map(String::as_str), Some("controller"));
        assert_eq!(assigned.get("com.a.UserRepository").map(String::as_str), Some("repository"));
        assert!(!assigned.contains_key("com.a.Util"));
    }
}
