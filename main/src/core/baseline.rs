use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::api::types::{Finding, RunError};

/// Separator between fingerprint fields.
const UNIT_SEPARATOR: u8 = 0x1F;

/// v1 fingerprint of a finding: sha-256 over the version tag, the
/// project-relative path, rule id, severity name, offsets, and the sorted
/// data entries, unit-separated. Message text is excluded, so rewording a
/// finding never changes its identity.
pub fn fingerprint(finding: &Finding) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"v1");
    let mut push = |piece: &str| {
        hasher.update([UNIT_SEPARATOR]);
        hasher.update(piece.as_bytes());
    };
    push(&finding.file_path);
    push(finding.rule_id.as_str());
    push(finding.severity.canonical_name());
    push(&finding.start.map(|v| v.to_string()).unwrap_or_default());
    push(&finding.end.map(|v| v.to_string()).unwrap_or_default());
    let mut entries: Vec<(&String, &String)> = finding.data.iter().collect();
    entries.sort();
    for (key, value) in entries {
        push(key);
        push(value);
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// The on-disk set of accepted fingerprints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineStore {
    /// Store format version.
    pub version: u32,
    /// Accepted fingerprints, sorted.
    pub fingerprints: BTreeSet<String>,
}

impl BaselineStore {
    /// Read the store; a missing file is an empty set.
    pub fn load(path: &Path) -> Result<BaselineStore, RunError> {
        if !path.exists() {
            return Ok(BaselineStore { version: 1, fingerprints: BTreeSet::new() });
        }
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| RunError::Config(format!("baseline file '{}' is invalid: {}", path.display(), e)))
    }

    /// Write the store, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), RunError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RunError::Config(format!("baseline serialization failed: {}", e)))?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Build a store from current findings.
    pub fn from_findings(findings: &[Finding]) -> BaselineStore {
        BaselineStore {
            version: 1,
            fingerprints: findings.iter().map(fingerprint).collect(),
        }
    }

    /// Union this store with another.
    pub fn merge(&mut self, other: &BaselineStore) {
        self.fingerprints
            .extend(other.fingerprints.iter().cloned());
    }

    /// Whether a fingerprint is accepted.
    pub fn contains(&self, fp: &str) -> bool {
        self.fingerprints.contains(fp)
    }
}

/// Drop findings whose fingerprints the baseline accepts. Returns the
/// survivors and the suppressed count.
pub fn apply_baseline(findings: Vec<Finding>, store: &BaselineStore) -> (Vec<Finding>, usize) {
    let before = findings.len();
    let kept: Vec<Finding> = findings
        .into_iter()
        .filter(|f| !store.contains(&fingerprint(f)))
        .collect();
    let suppressed = before - kept.len();
    (kept, suppressed)
}
