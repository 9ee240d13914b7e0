use std::sync::OnceLock;

use jsonschema::Validator;
use serde_json::Value;

use crate::api::types::ValidationError;

/// The embedded policy schema, v1. No network I/O: `$ref`s stay local.
pub const POLICY_SCHEMA: &str = include_str!("../../../../config/policy-schema.json");

fn validator() -> &'static Validator {
    static VALIDATOR: OnceLock<Validator> = OnceLock::new();
    VALIDATOR.get_or_init(|| {
        let schema: Value =
            serde_json::from_str(POLICY_SCHEMA).expect("embedded policy schema is valid JSON");
        jsonschema::validator_for(&schema).expect("embedded policy schema compiles")
    })
}

/// Convert a JSON-pointer instance location (`/rules/0/severity`) to the
/// dotted path form used by every validator (`rules[0].severity`).
fn pointer_to_dotted(pointer: &str) -> String {
    let mut out = String::new();
    for segment in pointer.split('/').filter(|s| !s.is_empty()) {
        let unescaped = segment.replace("~1", "/").replace("~0", "~");
        if unescaped.chars().all(|c| c.is_ascii_digit()) {
            out.push_str(&format!("[{}]", unescaped));
        } else {
            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(&unescaped);
        }
    }
    out
}

/// Structurally validate a raw policy document against the embedded schema.
pub fn validate_schema(raw: &Value) -> Vec<ValidationError> {
    validator()
        .iter_errors(raw)
        .map(|error| {
            ValidationError::error(
                pointer_to_dotted(&error.instance_path.to_string()),
                error.to_string(),
            )
        })
        .collect()
}
