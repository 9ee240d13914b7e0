use std::fs;
use std::path::{Path, PathBuf};

use crate::api::config::PolicyDoc;
use crate::api::types::RunError;

pub mod schema;
pub mod semantic;

/// Policy file names probed under the project root, in order.
const POLICY_FILE_NAMES: &[&str] = &["shamash.yml", "shamash.yaml"];

/// A parsed policy: the raw document (for schema validation and path
/// reporting) plus the typed model.
#[derive(Debug)]
pub struct LoadedPolicy {
    /// The raw document as parsed from YAML.
    pub raw: serde_json::Value,
    /// The typed policy model.
    pub doc: PolicyDoc,
}

/// Find the policy document under a project root.
pub fn locate_policy(project_root: &Path) -> Option<PathBuf> {
    POLICY_FILE_NAMES
        .iter()
        .map(|name| project_root.join(name))
        .find(|p| p.is_file())
}

/// Load and parse a policy file. Parse failures are configuration errors;
/// schema and semantic validation run separately so their diagnostics can
/// accumulate.
pub fn load_policy_file(path: &Path) -> Result<LoadedPolicy, RunError> {
    let text = fs::read_to_string(path).map_err(|e| {
        RunError::Config(format!("cannot read policy file '{}': {}", path.display(), e))
    })?;
    load_policy_str(&text)
}

/// Parse a policy document from YAML text.
pub fn load_policy_str(text: &str) -> Result<LoadedPolicy, RunError> {
    let raw: serde_json::Value = serde_yaml::from_str(text)
        .map_err(|e| RunError::Config(format!("policy is not valid YAML: {}", e)))?;
    let doc: PolicyDoc = serde_json::from_value(raw.clone())
        .map_err(|e| RunError::Config(format!("policy does not match the expected shape: {}", e)))?;
    Ok(LoadedPolicy { raw, doc })
}
