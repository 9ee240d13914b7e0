use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::api::config::ScoringConfig;
use crate::api::facts::FactIndex;

/// Score band assigned by strict threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScoreBand {
    /// Below the warning threshold.
    Ok,
    /// At or above the warning threshold.
    Warn,
    /// At or above the error threshold.
    Error,
}

/// Per-class composite ("god class") score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassScore {
    /// Class FQN.
    pub id: String,
    /// Weighted composite in [0, 1].
    pub score: f64,
    /// Band from the configured thresholds.
    pub band: ScoreBand,
    /// Raw fan-in.
    pub fan_in: u64,
    /// Raw fan-out.
    pub fan_out: u64,
    /// Raw declared non-constructor method count.
    pub methods: u64,
    /// Raw declared field count.
    pub fields: u64,
}

/// Per-package composite ("overall") score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageScore {
    /// Package name.
    pub id: String,
    /// Weighted composite in [0, 1].
    pub score: f64,
    /// Band from the configured thresholds.
    pub band: ScoreBand,
    /// Classes in the package.
    pub classes: u64,
    /// Distinct external classes referencing the package.
    pub fan_in: u64,
    /// Distinct external classes the package references.
    pub fan_out: u64,
    /// Distinct packages the package references.
    pub spread: u64,
}

/// The scoring table for one run (v1 model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringAnalysis {
    /// Class scores, ordered by score descending then id ascending.
    pub classes: Vec<ClassScore>,
    /// Package scores, same order.
    pub packages: Vec<PackageScore>,
}

fn band_of(score: f64, config: &ScoringConfig) -> ScoreBand {
    if score >= config.error_threshold {
        ScoreBand::Error
    } else if score >= config.warning_threshold {
        ScoreBand::Warn
    } else {
        ScoreBand::Ok
    }
}

/// Normalize against the per-metric max in this run, guarded against zero.
fn normalize(value: u64, max: u64) -> f64 {
    if max == 0 {
        0.0
    } else {
        value as f64 / max as f64
    }
}

fn clamp_unit(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

/// Compute class and package composites.
pub fn compute_scores(index: &FactIndex, config: &ScoringConfig) -> ScoringAnalysis {
    // Raw class metrics.
    struct ClassRaw {
        fan_in: u64,
        fan_out: u64,
        methods: u64,
        fields: u64,
    }
    let mut class_raw: BTreeMap<String, ClassRaw> = BTreeMap::new();
    for class in &index.classes {
        let fqn = class.fqn();
        class_raw.insert(
            fqn.to_string(),
            ClassRaw {
                fan_in: index
                    .incoming_refs(fqn)
                    .iter()
                    .filter(|f| index.contains_class(f))
                    .count() as u64,
                fan_out: index
                    .outgoing_refs(fqn)
                    .iter()
                    .filter(|t| index.contains_class(t))
                    .count() as u64,
                methods: index
                    .methods_of(fqn)
                    .iter()
                    .filter(|m| !m.is_constructor && !m.name.starts_with('<'))
                    .count() as u64,
                fields: index.fields_of(fqn).len() as u64,
            },
        );
    }

    let max_fan_in = class_raw.values().map(|r| r.fan_in).max().unwrap_or(0);
    let max_fan_out = class_raw.values().map(|r| r.fan_out).max().unwrap_or(0);
    let max_methods = class_raw.values().map(|r| r.methods).max().unwrap_or(0);
    let max_fields = class_raw.values().map(|r| r.fields).max().unwrap_or(0);

    let mut classes: Vec<ClassScore> = class_raw
        .into_iter()
        .map(|(id, raw)| {
            let score = clamp_unit(
                config.class_weight_fan_in * normalize(raw.fan_in, max_fan_in)
                    + config.class_weight_fan_out * normalize(raw.fan_out, max_fan_out)
                    + config.class_weight_methods * normalize(raw.methods, max_methods)
                    + config.class_weight_fields * normalize(raw.fields, max_fields),
            );
            ClassScore {
                id,
                score,
                band: band_of(score, config),
                fan_in: raw.fan_in,
                fan_out: raw.fan_out,
                methods: raw.methods,
                fields: raw.fields,
            }
        })
        .collect();
    classes.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    // Raw package metrics.
    struct PackageRaw {
        classes: u64,
        fan_in: BTreeSet<String>,
        fan_out: BTreeSet<String>,
        spread: BTreeSet<String>,
    }
    let mut package_raw: BTreeMap<String, PackageRaw> = BTreeMap::new();
    for class in &index.classes {
        let entry = package_raw
            .entry(class.package().to_string())
            .or_insert_with(|| PackageRaw {
                classes: 0,
                fan_in: BTreeSet::new(),
                fan_out: BTreeSet::new(),
                spread: BTreeSet::new(),
            });
        entry.classes += 1;
    }
    for edge in &index.edges {
        let Some(from_class) = index.class(&edge.from_fqn) else { continue };
        let Some(to_class) = index.class(&edge.to.fqn) else { continue };
        let from_pkg = from_class.package().to_string();
        let to_pkg = to_class.package().to_string();
        if from_pkg == to_pkg {
            continue;
        }
        if let Some(raw) = package_raw.get_mut(&from_pkg) {
            raw.fan_out.insert(edge.to.fqn.clone());
            raw.spread.insert(to_pkg.clone());
        }
        if let Some(raw) = package_raw.get_mut(&to_pkg) {
            raw.fan_in.insert(edge.from_fqn.clone());
        }
    }

    let max_pkg_classes = package_raw.values().map(|r| r.classes).max().unwrap_or(0);
    let max_pkg_fan_in = package_raw.values().map(|r| r.fan_in.len() as u64).max().unwrap_or(0);
    let max_pkg_fan_out = package_raw.values().map(|r| r.fan_out.len() as u64).max().unwrap_or(0);
    let max_pkg_spread = package_raw.values().map(|r| r.spread.len() as u64).max().unwrap_or(0);

    let mut packages: Vec<PackageScore> = package_raw
        .into_iter()
        .map(|(id, raw)| {
            let fan_in = raw.fan_in.len() as u64;
            let fan_out = raw.fan_out.len() as u64;
            let spread = raw.spread.len() as u64;
            let score = clamp_unit(
                config.package_weight_classes * normalize(raw.classes, max_pkg_classes)
                    + config.package_weight_fan_in * normalize(fan_in, max_pkg_fan_in)
                    + config.package_weight_fan_out * normalize(fan_out, max_pkg_fan_out)
                    + config.package_weight_spread * normalize(spread, max_pkg_spread),
            );
            PackageScore {
                id,
                score,
                band: band_of(score, config),
                classes: raw.classes,
                fan_in,
                fan_out,
                spread,
            }
        })
        .collect();
    packages.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    ScoringAnalysis { classes, packages }
}
