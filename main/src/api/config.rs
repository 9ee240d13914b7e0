use serde::{Deserialize, Serialize};

use crate::api::types::Severity;

// ---------------------------------------------------------------------------
// Case-tolerant enumerations
// ---------------------------------------------------------------------------

macro_rules! policy_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $canon:literal [$($alt:literal),*]),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            /// Canonical uppercase form used by the policy format.
            pub fn canonical_name(self) -> &'static str {
                match self {
                    $(Self::$variant => $canon,)+
                }
            }

            /// Case-tolerant parse of the canonical form.
            pub fn parse(s: &str) -> Option<Self> {
                match s.to_ascii_uppercase().replace('-', "_").as_str() {
                    $($canon => Some(Self::$variant), $($alt => Some(Self::$variant),)*)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.canonical_name())
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.canonical_name())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::parse(&s).ok_or_else(|| {
                    serde::de::Error::custom(format!("unknown {} value '{}'", stringify!($name), s))
                })
            }
        }
    };
}

policy_enum! {
    /// Which containers the scanner admits.
    ScanScope {
        /// Only directory roots matched by the include globs.
        ProjectOnly => "PROJECT_ONLY" [],
        /// Directory roots plus archives matched by the archive globs;
        /// classes found only in archives become external buckets.
        ProjectWithExternalBuckets => "PROJECT_WITH_EXTERNAL_BUCKETS" [],
        /// Everything reachable under the roots, archives fully extracted.
        AllSources => "ALL_SOURCES" [],
    }
}

policy_enum! {
    /// What to do when the policy names a rule the registry does not know.
    UnknownRulePolicy {
        /// Fail validation.
        Error => "ERROR" [],
        /// Emit a warning and skip the rule.
        Warn => "WARN" ["WARNING"],
        /// Skip the rule silently.
        Ignore => "IGNORE" [],
    }
}

policy_enum! {
    /// Node granularity for graph analysis.
    Granularity {
        /// One node per class.
        Class => "CLASS" [],
        /// One node per package.
        Package => "PACKAGE" [],
        /// One node per origin container.
        Module => "MODULE" [],
    }
}

policy_enum! {
    /// Baseline behavior for a run.
    BaselineMode {
        /// Baseline is not consulted or written.
        None => "NONE" [],
        /// Compute fingerprints from current findings and write the store.
        Generate => "GENERATE" [],
        /// Load the store and drop findings whose fingerprints match.
        Use => "USE" [],
    }
}

policy_enum! {
    /// Report formats the export stage can emit.
    ReportFormatKind {
        /// Canonical JSON report.
        Json => "JSON" [],
        /// SARIF 2.1.0.
        Sarif => "SARIF" [],
        /// XML report.
        Xml => "XML" [],
        /// Standalone HTML report.
        Html => "HTML" [],
    }
}

policy_enum! {
    /// Optional sidecar artifacts.
    SidecarKind {
        /// Full fact dump (`facts.json`, or `facts.jsonl.gz` when compressed).
        Facts => "FACTS" [],
        /// Role assignment (`roles.json`).
        Roles => "ROLES" [],
        /// Resolved rule plan (`rule-plan.json`).
        RulePlan => "RULE_PLAN" ["RULEPLAN"],
        /// Graph analysis (`analysis-graphs.json`).
        AnalysisGraphs => "ANALYSIS_GRAPHS" ["ANALYSISGRAPHS"],
        /// Hotspot table (`analysis-hotspots.json`).
        AnalysisHotspots => "ANALYSIS_HOTSPOTS" ["ANALYSISHOTSPOTS"],
        /// Scoring table (`analysis-scores.json`).
        AnalysisScores => "ANALYSIS_SCORES" ["ANALYSISSCORES"],
    }
}

// ---------------------------------------------------------------------------
// Policy document
// ---------------------------------------------------------------------------

/// The policy document, schema v1. Loaded once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDoc {
    /// Policy schema version; must be 1.
    pub version: u32,
    /// Project scanning configuration.
    pub project: ProjectConfig,
    /// Role definitions, matched by priority then id.
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
    /// Graph/hotspot/scoring analysis configuration.
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Configured rules, in declaration order.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    /// Finding suppressions.
    #[serde(default)]
    pub exceptions: Vec<ExceptionConfig>,
    /// Baseline behavior.
    #[serde(default)]
    pub baseline: BaselineConfig,
    /// Export configuration.
    #[serde(default)]
    pub export: ExportConfig,
}

/// Where and how to scan for class files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Bytecode roots, relative to the project root.
    pub bytecode_roots: Vec<String>,
    /// Globs a directory class path must match. Default `**/*.class`.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Globs that exclude directory class paths.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Globs selecting archives for external bucketing / full extraction.
    #[serde(default)]
    pub archive_globs: Vec<String>,
    /// Which containers the scanner admits.
    #[serde(default = "default_scan_scope")]
    pub scan_scope: ScanScope,
    /// Whether the walker follows symbolic links.
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Hard limits that abort extraction with a typed error.
    #[serde(default)]
    pub limits: ScanLimits,
    /// Validation knobs.
    #[serde(default)]
    pub validation: ValidationPolicy,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.class".to_string()]
}

fn default_scan_scope() -> ScanScope {
    ScanScope::ProjectOnly
}

/// Hard scan limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanLimits {
    /// Maximum number of classes admitted to the index.
    #[serde(default = "default_max_classes")]
    pub max_classes: u64,
    /// Maximum total bytes decompressed from a single archive.
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,
    /// Maximum size of a single class file.
    #[serde(default = "default_max_class_bytes")]
    pub max_class_bytes: u64,
}

fn default_max_classes() -> u64 {
    200_000
}

fn default_max_archive_bytes() -> u64 {
    1_073_741_824
}

fn default_max_class_bytes() -> u64 {
    16_777_216
}

impl Default for ScanLimits {
    fn default() -> Self {
        ScanLimits {
            max_classes: default_max_classes(),
            max_archive_bytes: default_max_archive_bytes(),
            max_class_bytes: default_max_class_bytes(),
        }
    }
}

/// Validation knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationPolicy {
    /// What to do when the policy names a rule the registry does not know.
    #[serde(default = "default_unknown_rule")]
    pub unknown_rule: UnknownRulePolicy,
}

fn default_unknown_rule() -> UnknownRulePolicy {
    UnknownRulePolicy::Error
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        ValidationPolicy { unknown_rule: default_unknown_rule() }
    }
}

/// One architectural role, assigned to classes via its matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleConfig {
    /// Role id referenced by rules and scopes.
    pub id: String,
    /// Higher priority wins; ties break on ascending id.
    #[serde(default)]
    pub priority: i32,
    /// Optional human description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The matcher expression.
    #[serde(rename = "match")]
    pub matcher: MatcherConfig,
}

/// One node of the matcher grammar. Exactly one selector must be set per
/// node; `caseSensitive` tunes the string-based leaves (default true).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MatcherConfig {
    /// True if any child matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<MatcherConfig>>,
    /// True if all children match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_of: Option<Vec<MatcherConfig>>,
    /// Negation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<MatcherConfig>>,
    /// Regex over the dot-separated package name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_regex: Option<String>,
    /// Whole dot-delimited package segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_contains_segment: Option<String>,
    /// Regex over the simple class name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name_regex: Option<String>,
    /// Simple-name suffix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name_ends_with: Option<String>,
    /// Any of several simple-name suffixes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name_ends_with_any: Option<Vec<String>>,
    /// Exact annotation FQN present on the class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
    /// Annotation FQN prefix present on the class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_prefix: Option<String>,
    /// Directly implemented interface FQN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implements: Option<String>,
    /// Direct superclass FQN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    /// Whether the class declares a main method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_main_method: Option<bool>,
    /// Case sensitivity for the string leaves of this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_sensitive: Option<bool>,
}

/// Graph/hotspot/scoring analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// Whether analysis artifacts are computed at all.
    #[serde(default)]
    pub enabled: bool,
    /// Node granularity for graph construction.
    #[serde(default = "default_granularity")]
    pub granularity: Granularity,
    /// Whether external buckets are admitted as graph nodes.
    #[serde(default)]
    pub include_external: bool,
    /// Hotspot ranking configuration.
    #[serde(default)]
    pub hotspots: HotspotsConfig,
    /// Weighted scoring configuration.
    #[serde(default)]
    pub scoring: ScoringConfig,
}

fn default_granularity() -> Granularity {
    Granularity::Class
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            enabled: false,
            granularity: default_granularity(),
            include_external: false,
            hotspots: HotspotsConfig::default(),
            scoring: ScoringConfig::default(),
        }
    }
}

/// Hotspot ranking configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotsConfig {
    /// How many nodes each metric contributes.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_top_n() -> usize {
    10
}

impl Default for HotspotsConfig {
    fn default() -> Self {
        HotspotsConfig { top_n: default_top_n() }
    }
}

/// v1 scoring model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringConfig {
    /// Per-class composite weights: fanIn, fanOut, methods, fields.
    #[serde(default = "default_quarter")]
    pub class_weight_fan_in: f64,
    /// See `class_weight_fan_in`.
    #[serde(default = "default_quarter")]
    pub class_weight_fan_out: f64,
    /// See `class_weight_fan_in`.
    #[serde(default = "default_quarter")]
    pub class_weight_methods: f64,
    /// See `class_weight_fan_in`.
    #[serde(default = "default_quarter")]
    pub class_weight_fields: f64,
    /// Per-package composite weights: classes, fanIn, fanOut, spread.
    #[serde(default = "default_quarter")]
    pub package_weight_classes: f64,
    /// See `package_weight_classes`.
    #[serde(default = "default_quarter")]
    pub package_weight_fan_in: f64,
    /// See `package_weight_classes`.
    #[serde(default = "default_quarter")]
    pub package_weight_fan_out: f64,
    /// See `package_weight_classes`.
    #[serde(default = "default_quarter")]
    pub package_weight_spread: f64,
    /// Scores at or above this band WARN.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,
    /// Scores at or above this band ERROR.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: f64,
}

fn default_quarter() -> f64 {
    0.25
}

fn default_warning_threshold() -> f64 {
    0.5
}

fn default_error_threshold() -> f64 {
    0.8
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            class_weight_fan_in: 0.25,
            class_weight_fan_out: 0.25,
            class_weight_methods: 0.25,
            class_weight_fields: 0.25,
            package_weight_classes: 0.25,
            package_weight_fan_in: 0.25,
            package_weight_fan_out: 0.25,
            package_weight_spread: 0.25,
            warning_threshold: 0.5,
            error_threshold: 0.8,
        }
    }
}

/// One configured rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    /// Canonical `<type>.<name>` id.
    pub id: String,
    /// Disabled rules validate but never run.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Severity assigned to this rule's findings.
    #[serde(default = "default_severity")]
    pub severity: Severity,
    /// Top-level role restriction; `None` means all roles (and role-less classes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    /// Finer-grained scope filter. Never widens the top-level role list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeConfig>,
    /// Free-form rule parameters, validated by the rule's spec.
    #[serde(default)]
    pub params: serde_json::Value,
}

fn default_true() -> bool {
    true
}

fn default_severity() -> Severity {
    Severity::Warning
}

/// Class admission filter for a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScopeConfig {
    /// Roles to admit; empty means no role restriction from this field.
    #[serde(default)]
    pub include_roles: Vec<String>,
    /// Roles to reject.
    #[serde(default)]
    pub exclude_roles: Vec<String>,
    /// Package regexes to admit.
    #[serde(default)]
    pub include_packages: Vec<String>,
    /// Package regexes to reject.
    #[serde(default)]
    pub exclude_packages: Vec<String>,
    /// Path globs to admit.
    #[serde(default)]
    pub include_globs: Vec<String>,
    /// Path globs to reject.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

/// One suppression entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionConfig {
    /// Optional reason, for humans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// ISO date (`YYYY-MM-DD`) after which the exception is expired.
    /// Expired exceptions warn at validation time and still apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<String>,
    /// Conjunction of selectors; at least one must be declared.
    #[serde(rename = "match")]
    pub matcher: ExceptionMatch,
    /// Rule ids to suppress; empty means every rule the selectors match.
    #[serde(default)]
    pub suppress: Vec<String>,
}

/// Selector set for an exception. Every declared selector must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExceptionMatch {
    /// Exact canonical rule id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Rule type half.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<String>,
    /// Rule name half.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
    /// Role ids; matches when the finding's class holds any of them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// Exact slash-separated internal class name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_internal_name: Option<String>,
    /// Regex over the class FQN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name_regex: Option<String>,
    /// Regex over the package name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_regex: Option<String>,
    /// Regex over the finding's origin path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_path_regex: Option<String>,
    /// Glob over the finding's file path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_glob: Option<String>,
}

impl ExceptionMatch {
    /// Whether at least one selector is declared.
    pub fn has_any_selector(&self) -> bool {
        self.rule_id.is_some()
            || self.rule_type.is_some()
            || self.rule_name.is_some()
            || !self.roles.is_empty()
            || self.class_internal_name.is_some()
            || self.class_name_regex.is_some()
            || self.package_regex.is_some()
            || self.origin_path_regex.is_some()
            || self.file_glob.is_some()
    }
}

/// Baseline behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineConfig {
    /// NONE, GENERATE, or USE.
    #[serde(default = "default_baseline_mode")]
    pub mode: BaselineMode,
    /// GENERATE only: union with the existing store instead of replacing it.
    #[serde(default)]
    pub merge: bool,
}

fn default_baseline_mode() -> BaselineMode {
    BaselineMode::None
}

impl Default for BaselineConfig {
    fn default() -> Self {
        BaselineConfig { mode: default_baseline_mode(), merge: false }
    }
}

/// Export configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportConfig {
    /// Output directory, relative to the project root. Default `.shamash`.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Report formats to write.
    #[serde(default = "default_formats")]
    pub formats: Vec<ReportFormatKind>,
    /// Sidecar artifacts to write.
    #[serde(default)]
    pub sidecars: Vec<SidecarKind>,
    /// Write facts as gzip-compressed JSON-lines instead of one JSON file.
    #[serde(default)]
    pub facts_compressed: bool,
}

fn default_output_dir() -> String {
    ".shamash".to_string()
}

fn default_formats() -> Vec<ReportFormatKind> {
    vec![ReportFormatKind::Json]
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            output_dir: default_output_dir(),
            formats: default_formats(),
            sidecars: vec![],
            facts_compressed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_scope_case_tolerant() {
        assert_eq!(ScanScope::parse("project_only"), Some(ScanScope::ProjectOnly));
        assert_eq!(
            ScanScope::parse("PROJECT-WITH-EXTERNAL-BUCKETS"),
            Some(ScanScope::ProjectWithExternalBuckets)
        );
        assert_eq!(ScanScope::parse("everything"), None);
    }

    #[test]
    fn test_policy_yaml_minimal() {
        let yaml = r#"
version: 1
project:
  bytecodeRoots: ["build/classes"]
"#;
        let doc: PolicyDoc = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(doc.version, 1);
        assert_eq!(doc.project.bytecode_roots, vec!["build/classes"]);
        assert_eq!(doc.project.include_globs, vec!["**/*.class"]);
        assert_eq!(doc.project.scan_scope, ScanScope::ProjectOnly);
        assert_eq!(doc.baseline.mode, BaselineMode::None);
        assert_eq!(doc.export.output_dir, ".shamash");
    }

    #[test]
    fn test_policy_yaml_roles_and_rules() {
        let yaml = r#"
version: 1
project:
  bytecodeRoots: ["out"]
roles:
  - id: controller
    priority: 10
    match:
      classNameEndsWith: Controller
rules:
  - id: metrics.maxFieldsPerClass
    severity: error
    params:
      max: 10
"#;
        let doc: PolicyDoc = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(doc.roles.len(), 1);
        assert_eq!(doc.roles[0].matcher.class_name_ends_with.as_deref(), Some("Controller"));
        assert_eq!(doc.rules[0].severity, Severity::Error);
        assert_eq!(doc.rules[0].params["max"], 10);
        assert!(doc.rules[0].enabled);
    }

    #[test]
    fn test_exception_selector_presence() {
        let none = ExceptionMatch::default();
        assert!(!none.has_any_selector());
        let some = ExceptionMatch { rule_type: Some("arch".to_string()), ..Default::default() };
        assert!(some.has_any_selector());
    }

    #[test]
    fn test_matcher_unknown_key_rejected() {
        let yaml = "classNameSuffix: Controller";
        let parsed: Result<MatcherConfig, _> = serde_yaml::from_str(yaml);
        assert!(parsed.is_err());
    }
}
