use std::collections::BTreeSet;

use regex::Regex;

use crate::api::config::{Granularity, RuleConfig};
use crate::api::facts::DependencyKind;
use crate::api::types::ValidationError;
use crate::core::params::ParamReader;
use crate::core::paths::glob_to_regex;

/// What a spec validator may consult: the declared role ids and the rule ids
/// configured in the policy.
pub struct SpecContext<'a> {
    /// Role ids declared under `roles`.
    pub role_ids: &'a BTreeSet<String>,
    /// Rule ids configured under `rules`.
    pub rule_ids: &'a BTreeSet<String>,
}

type Validate = fn(&ParamReader<'_>, &SpecContext<'_>, &mut Vec<ValidationError>);

/// One rule's parameter contract: the allowed keys and a semantic validator.
/// Specs never execute the rule.
pub struct RuleSpec {
    /// Canonical `<type>.<name>` id.
    pub id: &'static str,
    /// Every parameter key the rule understands. Anything else is an error.
    pub allowed_keys: &'static [&'static str],
    validate: Validate,
}

/// Look up the spec for a rule id.
pub fn spec_for(id: &str) -> Option<&'static RuleSpec> {
    SPECS.iter().find(|s| s.id == id)
}

/// Ids of every rule that has a spec, ascending.
pub fn spec_ids() -> Vec<&'static str> {
    let mut ids: Vec<&'static str> = SPECS.iter().map(|s| s.id).collect();
    ids.sort();
    ids
}

/// Validate one configured rule's parameters against its spec: unknown keys
/// first, then per-parameter semantics. Paths are rooted at
/// `rules[i].params`.
pub fn validate_rule_params(
    rule_index: usize,
    config: &RuleConfig,
    ctx: &SpecContext<'_>,
) -> Vec<ValidationError> {
    let Some(spec) = spec_for(&config.id) else {
        return vec![];
    };
    let path = format!("rules[{}].params", rule_index);
    let reader = ParamReader::new(&config.params, path.clone());
    let mut errors = Vec::new();
    for key in reader.unknown_keys(spec.allowed_keys) {
        errors.push(ValidationError::error(
            format!("{}.{}", path, key),
            format!("unknown parameter '{}' for rule '{}'", key, config.id),
        ));
    }
    (spec.validate)(&reader, ctx, &mut errors);
    errors
}

// ---------------------------------------------------------------------------
// Shared checks
// ---------------------------------------------------------------------------

fn push_param_err(
    errors: &mut Vec<ValidationError>,
    result: Result<(), crate::core::params::ParamError>,
) {
    if let Err(e) = result {
        errors.push(ValidationError::error(e.path, e.message));
    }
}

fn check_regex(pattern: &str, path: String, errors: &mut Vec<ValidationError>) {
    if let Err(e) = Regex::new(pattern) {
        errors.push(ValidationError::error(path, format!("invalid regex '{}': {}", pattern, e)));
    }
}

fn check_regex_list(reader: &ParamReader<'_>, key: &str, errors: &mut Vec<ValidationError>) {
    match reader.optional_string_list(key) {
        Ok(Some(patterns)) => {
            for (i, pattern) in patterns.iter().enumerate() {
                check_regex(pattern, format!("{}.{}[{}]", reader.path(), key, i), errors);
            }
        }
        Ok(None) => {}
        Err(e) => errors.push(ValidationError::error(e.path, e.message)),
    }
}

fn check_required_regex_list(reader: &ParamReader<'_>, key: &str, errors: &mut Vec<ValidationError>) {
    match reader.require_string_list(key, true) {
        Ok(patterns) => {
            for (i, pattern) in patterns.iter().enumerate() {
                check_regex(pattern, format!("{}.{}[{}]", reader.path(), key, i), errors);
            }
        }
        Err(e) => errors.push(ValidationError::error(e.path, e.message)),
    }
}

fn check_non_negative(reader: &ParamReader<'_>, key: &str, errors: &mut Vec<ValidationError>) {
    push_param_err(errors, reader.require_non_negative_int(key).map(|_| ()));
}

fn check_optional_bool(reader: &ParamReader<'_>, key: &str, errors: &mut Vec<ValidationError>) {
    push_param_err(errors, reader.optional_bool(key).map(|_| ()));
}

fn check_roles_exist(
    roles: &[String],
    base_path: &str,
    ctx: &SpecContext<'_>,
    errors: &mut Vec<ValidationError>,
) {
    for (i, role) in roles.iter().enumerate() {
        if !ctx.role_ids.contains(role) {
            errors.push(ValidationError::error(
                format!("{}[{}]", base_path, i),
                format!("unknown role id '{}'", role),
            ));
        }
    }
}

fn check_role_exists(role: &str, path: String, ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    if !ctx.role_ids.contains(role) {
        errors.push(ValidationError::error(path, format!("unknown role id '{}'", role)));
    }
}

fn check_kinds(reader: &ParamReader<'_>, errors: &mut Vec<ValidationError>) {
    match reader.optional_string_list("kinds") {
        Ok(Some(names)) => {
            for (i, name) in names.iter().enumerate() {
                if DependencyKind::parse(name).is_none() {
                    errors.push(ValidationError::error(
                        format!("{}.kinds[{}]", reader.path(), i),
                        format!("unknown dependency kind '{}'", name),
                    ));
                }
            }
        }
        Ok(None) => {}
        Err(e) => errors.push(ValidationError::error(e.path, e.message)),
    }
}

fn check_count_kinds(reader: &ParamReader<'_>, errors: &mut Vec<ValidationError>) {
    match reader.optional_string_list("countKinds") {
        Ok(Some(names)) => {
            for (i, name) in names.iter().enumerate() {
                let known = matches!(
                    name.to_ascii_uppercase().as_str(),
                    "DECLARED_METHODS" | "PUBLIC_METHODS" | "PRIVATE_METHODS"
                );
                if !known {
                    errors.push(ValidationError::error(
                        format!("{}.countKinds[{}]", reader.path(), i),
                        format!("unknown counting kind '{}'", name),
                    ));
                }
            }
        }
        Ok(None) => {}
        Err(e) => errors.push(ValidationError::error(e.path, e.message)),
    }
}

fn check_role_pair_list(
    reader: &ParamReader<'_>,
    key: &str,
    ctx: &SpecContext<'_>,
    errors: &mut Vec<ValidationError>,
) {
    match reader.require_list(key) {
        Ok(entries) => {
            for entry in entries {
                for unknown in entry.unknown_keys(&["from", "to", "message"]) {
                    errors.push(ValidationError::error(
                        format!("{}.{}", entry.path(), unknown),
                        format!("unknown key '{}'", unknown),
                    ));
                }
                match entry.require_string("from") {
                    Ok(from) => {
                        check_role_exists(&from, format!("{}.from", entry.path()), ctx, errors)
                    }
                    Err(e) => errors.push(ValidationError::error(e.path, e.message)),
                }
                match entry.require_string_list("to", true) {
                    Ok(to) => check_roles_exist(&to, &format!("{}.to", entry.path()), ctx, errors),
                    Err(e) => errors.push(ValidationError::error(e.path, e.message)),
                }
                push_param_err(errors, entry.optional_string("message").map(|_| ()));
            }
        }
        Err(e) => errors.push(ValidationError::error(e.path, e.message)),
    }
}

fn check_package_pair_list(reader: &ParamReader<'_>, key: &str, errors: &mut Vec<ValidationError>) {
    match reader.require_list(key) {
        Ok(entries) => {
            for entry in entries {
                for unknown in entry.unknown_keys(&["from", "to", "message"]) {
                    errors.push(ValidationError::error(
                        format!("{}.{}", entry.path(), unknown),
                        format!("unknown key '{}'", unknown),
                    ));
                }
                match entry.require_string("from") {
                    Ok(pattern) => {
                        check_regex(&pattern, format!("{}.from", entry.path()), errors)
                    }
                    Err(e) => errors.push(ValidationError::error(e.path, e.message)),
                }
                match entry.require_string_list("to", true) {
                    Ok(patterns) => {
                        for (i, pattern) in patterns.iter().enumerate() {
                            check_regex(pattern, format!("{}.to[{}]", entry.path(), i), errors);
                        }
                    }
                    Err(e) => errors.push(ValidationError::error(e.path, e.message)),
                }
                push_param_err(errors, entry.optional_string("message").map(|_| ()));
            }
        }
        Err(e) => errors.push(ValidationError::error(e.path, e.message)),
    }
}

fn check_granularity(reader: &ParamReader<'_>, errors: &mut Vec<ValidationError>) {
    push_param_err(
        errors,
        reader
            .optional_enum("granularity", Granularity::parse, "CLASS|PACKAGE|MODULE")
            .map(|_| ()),
    );
}

// ---------------------------------------------------------------------------
// Per-rule validators
// ---------------------------------------------------------------------------

fn v_banned_suffixes(reader: &ParamReader<'_>, ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    push_param_err(errors, reader.require_string_list("banned", true).map(|_| ()));
    match reader.optional_string("applyTo") {
        Ok(Some(value)) => {
            if !matches!(value.as_str(), "classes" | "methods" | "fields" | "all") {
                errors.push(ValidationError::error(
                    format!("{}.applyTo", reader.path()),
                    format!("expected one of classes|methods|fields|all, found '{}'", value),
                ));
            }
        }
        Ok(None) => {}
        Err(e) => errors.push(ValidationError::error(e.path, e.message)),
    }
    check_optional_bool(reader, "caseSensitive", errors);
    match reader.optional_string_list("applyToRoles") {
        Ok(Some(roles)) => {
            check_roles_exist(&roles, &format!("{}.applyToRoles", reader.path()), ctx, errors)
        }
        Ok(None) => {}
        Err(e) => errors.push(ValidationError::error(e.path, e.message)),
    }
}

fn v_role_placement(reader: &ParamReader<'_>, ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    match reader.require_map("expected") {
        Ok(expected) => match expected.entries() {
            Ok(entries) => {
                for (role, entry) in entries {
                    check_role_exists(&role, entry.path().to_string(), ctx, errors);
                    for unknown in entry.unknown_keys(&["packageRegex"]) {
                        errors.push(ValidationError::error(
                            format!("{}.{}", entry.path(), unknown),
                            format!("unknown key '{}'", unknown),
                        ));
                    }
                    match entry.require_string("packageRegex") {
                        Ok(pattern) => check_regex(
                            &pattern,
                            format!("{}.packageRegex", entry.path()),
                            errors,
                        ),
                        Err(e) => errors.push(ValidationError::error(e.path, e.message)),
                    }
                }
            }
            Err(e) => errors.push(ValidationError::error(e.path, e.message)),
        },
        Err(e) => errors.push(ValidationError::error(e.path, e.message)),
    }
}

fn v_root_package(reader: &ParamReader<'_>, _ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    let mode = match reader.optional_string("mode") {
        Ok(Some(mode)) => {
            let upper = mode.to_ascii_uppercase();
            if upper != "AUTO" && upper != "EXPLICIT" {
                errors.push(ValidationError::error(
                    format!("{}.mode", reader.path()),
                    format!("expected AUTO or EXPLICIT, found '{}'", mode),
                ));
            }
            upper
        }
        Ok(None) => {
            errors.push(ValidationError::error(
                format!("{}.mode", reader.path()),
                "required parameter is missing",
            ));
            return;
        }
        Err(e) => {
            errors.push(ValidationError::error(e.path, e.message));
            return;
        }
    };
    let value = match reader.optional_string("value") {
        Ok(v) => v,
        Err(e) => {
            errors.push(ValidationError::error(e.path, e.message));
            return;
        }
    };
    match (mode.as_str(), value) {
        ("EXPLICIT", None) => errors.push(ValidationError::error(
            format!("{}.value", reader.path()),
            "EXPLICIT mode requires a value",
        )),
        ("AUTO", Some(_)) => errors.push(ValidationError::error(
            format!("{}.value", reader.path()),
            "AUTO mode must not set a value",
        )),
        _ => {}
    }
}

fn v_forbidden_role_deps(reader: &ParamReader<'_>, ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    check_kinds(reader, errors);
    check_role_pair_list(reader, "forbidden", ctx, errors);
}

fn v_allowed_role_deps(reader: &ParamReader<'_>, ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    check_kinds(reader, errors);
    check_role_pair_list(reader, "allowed", ctx, errors);
}

fn v_forbidden_packages(reader: &ParamReader<'_>, _ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    check_kinds(reader, errors);
    check_package_pair_list(reader, "forbidden", errors);
}

fn v_allowed_packages(reader: &ParamReader<'_>, _ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    check_kinds(reader, errors);
    check_package_pair_list(reader, "allowed", errors);
}

fn v_max_methods_by_role(reader: &ParamReader<'_>, ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    match reader.require_map("limits") {
        Ok(limits) => match limits.entries() {
            Ok(entries) => {
                for (role, entry) in entries {
                    check_role_exists(&role, entry.path().to_string(), ctx, errors);
                    push_param_err(errors, limits.require_non_negative_int(&role).map(|_| ()));
                }
            }
            Err(e) => errors.push(ValidationError::error(e.path, e.message)),
        },
        Err(e) => errors.push(ValidationError::error(e.path, e.message)),
    }
    check_count_kinds(reader, errors);
    check_regex_list(reader, "ignoreMethodNameRegex", errors);
}

fn v_max_methods_per_class(reader: &ParamReader<'_>, _ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    check_non_negative(reader, "max", errors);
    check_count_kinds(reader, errors);
    check_regex_list(reader, "ignoreMethodNameRegex", errors);
}

fn v_max_simple(reader: &ParamReader<'_>, _ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    check_non_negative(reader, "max", errors);
}

fn v_max_coupling(reader: &ParamReader<'_>, _ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    check_non_negative(reader, "max", errors);
    check_optional_bool(reader, "includeExternal", errors);
}

fn v_unused_private(reader: &ParamReader<'_>, _ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    match reader.optional_map("check") {
        Ok(Some(check)) => {
            for unknown in check.unknown_keys(&["fields", "methods", "classes"]) {
                errors.push(ValidationError::error(
                    format!("{}.{}", check.path(), unknown),
                    format!("unknown key '{}'", unknown),
                ));
            }
            check_optional_bool(&check, "fields", errors);
            check_optional_bool(&check, "methods", errors);
            check_optional_bool(&check, "classes", errors);
        }
        Ok(None) => {}
        Err(e) => errors.push(ValidationError::error(e.path, e.message)),
    }
    push_param_err(errors, reader.optional_string_list("ignoreAnnotatedWith").map(|_| ()));
    check_regex_list(reader, "ignoreNameRegex", errors);
}

fn v_forbid_regexes(reader: &ParamReader<'_>, _ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    check_required_regex_list(reader, "forbid", errors);
}

fn v_graph_gate(reader: &ParamReader<'_>, _ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    check_granularity(reader, errors);
    check_optional_bool(reader, "includeExternal", errors);
}

fn v_graph_gate_max(reader: &ParamReader<'_>, ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    check_non_negative(reader, "max", errors);
    v_graph_gate(reader, ctx, errors);
}

fn v_max_density(reader: &ParamReader<'_>, ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    match reader.require_f64("max") {
        Ok(max) if max < 0.0 => errors.push(ValidationError::error(
            format!("{}.max", reader.path()),
            format!("must be non-negative, found {}", max),
        )),
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::error(e.path, e.message)),
    }
    v_graph_gate(reader, ctx, errors);
}

fn v_forbidden_jars(reader: &ParamReader<'_>, _ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    match reader.require_string_list("forbidden", true) {
        Ok(globs) => {
            for (i, glob) in globs.iter().enumerate() {
                if glob_to_regex(glob).is_none() {
                    errors.push(ValidationError::error(
                        format!("{}.forbidden[{}]", reader.path(), i),
                        format!("invalid glob '{}'", glob),
                    ));
                }
            }
        }
        Err(e) => errors.push(ValidationError::error(e.path, e.message)),
    }
}

fn v_allow_only_root(reader: &ParamReader<'_>, _ctx: &SpecContext<'_>, errors: &mut Vec<ValidationError>) {
    push_param_err(errors, reader.require_string("rootPackage").map(|_| ()));
}

static SPECS: &[RuleSpec] = &[
    RuleSpec {
        id: "naming.bannedSuffixes",
        allowed_keys: &["banned", "applyTo", "caseSensitive", "applyToRoles"],
        validate: v_banned_suffixes,
    },
    RuleSpec {
        id: "packages.rolePlacement",
        allowed_keys: &["expected"],
        validate: v_role_placement,
    },
    RuleSpec {
        id: "packages.rootPackage",
        allowed_keys: &["mode", "value"],
        validate: v_root_package,
    },
    RuleSpec {
        id: "arch.forbiddenRoleDependencies",
        allowed_keys: &["kinds", "forbidden"],
        validate: v_forbidden_role_deps,
    },
    RuleSpec {
        id: "arch.allowedRoleDependencies",
        allowed_keys: &["kinds", "allowed"],
        validate: v_allowed_role_deps,
    },
    RuleSpec {
        id: "arch.forbiddenPackages",
        allowed_keys: &["kinds", "forbidden"],
        validate: v_forbidden_packages,
    },
    RuleSpec {
        id: "arch.allowedPackages",
        allowed_keys: &["kinds", "allowed"],
        validate: v_allowed_packages,
    },
    RuleSpec {
        id: "metrics.maxMethodsByRole",
        allowed_keys: &["limits", "countKinds", "ignoreMethodNameRegex"],
        validate: v_max_methods_by_role,
    },
    RuleSpec {
        id: "metrics.maxMethodsPerClass",
        allowed_keys: &["max", "countKinds", "ignoreMethodNameRegex"],
        validate: v_max_methods_per_class,
    },
    RuleSpec {
        id: "metrics.maxFieldsPerClass",
        allowed_keys: &["max"],
        validate: v_max_simple,
    },
    RuleSpec {
        id: "metrics.maxFanIn",
        allowed_keys: &["max", "includeExternal"],
        validate: v_max_coupling,
    },
    RuleSpec {
        id: "metrics.maxFanOut",
        allowed_keys: &["max", "includeExternal"],
        validate: v_max_coupling,
    },
    RuleSpec {
        id: "metrics.maxPackageSpread",
        allowed_keys: &["max", "includeExternal"],
        validate: v_max_coupling,
    },
    RuleSpec {
        id: "deadcode.unusedPrivateMembers",
        allowed_keys: &["check", "ignoreAnnotatedWith", "ignoreNameRegex"],
        validate: v_unused_private,
    },
    RuleSpec {
        id: "api.forbiddenAnnotationUsage",
        allowed_keys: &["forbid"],
        validate: v_forbid_regexes,
    },
    RuleSpec {
        id: "api.forbiddenInternalNamePatterns",
        allowed_keys: &["forbid"],
        validate: v_forbid_regexes,
    },
    RuleSpec {
        id: "api.maxPublicTypes",
        allowed_keys: &["max"],
        validate: v_max_simple,
    },
    RuleSpec {
        id: "graph.noCycles",
        allowed_keys: &["granularity", "includeExternal"],
        validate: v_graph_gate,
    },
    RuleSpec {
        id: "graph.maxCycles",
        allowed_keys: &["max", "granularity", "includeExternal"],
        validate: v_graph_gate_max,
    },
    RuleSpec {
        id: "graph.maxEdgeCount",
        allowed_keys: &["max", "granularity", "includeExternal"],
        validate: v_graph_gate_max,
    },
    RuleSpec {
        id: "graph.maxDependencyDensity",
        allowed_keys: &["max", "granularity", "includeExternal"],
        validate: v_max_density,
    },
    RuleSpec {
        id: "origin.forbiddenJarDependencies",
        allowed_keys: &["forbidden"],
        validate: v_forbidden_jars,
    },
    RuleSpec {
        id: "origin.allowOnlyRoot",
        allowed_keys: &["rootPackage"],
        validate: v_allow_only_root,
    },
];
