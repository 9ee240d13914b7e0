use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::api::config::Granularity;
use crate::api::facts::FactIndex;
use crate::core::graph::GraphAnalysis;

/// Metrics a node can rank under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HotspotMetric {
    /// Distinct incoming neighbors.
    FanIn,
    /// Distinct outgoing neighbors.
    FanOut,
    /// Distinct packages among outgoing class references.
    PackageSpread,
    /// Declared non-constructor methods.
    MethodCount,
}

impl HotspotMetric {
    /// Every metric, in ranking order.
    pub fn all() -> &'static [HotspotMetric] {
        &[
            HotspotMetric::FanIn,
            HotspotMetric::FanOut,
            HotspotMetric::PackageSpread,
            HotspotMetric::MethodCount,
        ]
    }
}

/// Why a node ranks: one entry per metric it placed in the top-N of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotReason {
    /// The metric.
    pub metric: HotspotMetric,
    /// Raw metric value.
    pub value: u64,
    /// 1-based rank under that metric.
    pub rank: usize,
}

/// One ranked node with every metric it placed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotEntry {
    /// Node kind (the analysis granularity).
    pub kind: Granularity,
    /// Node id.
    pub id: String,
    /// Reasons, in metric order.
    pub reasons: Vec<HotspotReason>,
}

/// The aggregated hotspot table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotAnalysis {
    /// Node granularity the table was computed at.
    pub granularity: Granularity,
    /// Entries ordered by max metric value descending, then id ascending.
    pub entries: Vec<HotspotEntry>,
}

fn package_of(id: &str) -> &str {
    id.rsplit_once('.').map(|(p, _)| p).unwrap_or("")
}

/// Raw metric values for every node of the analysis graph.
fn node_metrics(
    index: &FactIndex,
    graph: &GraphAnalysis,
) -> BTreeMap<String, BTreeMap<HotspotMetric, u64>> {
    let mut fan_in: BTreeMap<usize, u64> = BTreeMap::new();
    let mut fan_out: BTreeMap<usize, u64> = BTreeMap::new();
    for [from, to] in &graph.edges {
        *fan_out.entry(*from).or_default() += 1;
        *fan_in.entry(*to).or_default() += 1;
    }

    let mut metrics: BTreeMap<String, BTreeMap<HotspotMetric, u64>> = BTreeMap::new();
    for (i, id) in graph.nodes.iter().enumerate() {
        let mut values = BTreeMap::new();
        values.insert(HotspotMetric::FanIn, fan_in.get(&i).copied().unwrap_or(0));
        values.insert(HotspotMetric::FanOut, fan_out.get(&i).copied().unwrap_or(0));

        let (spread, method_count) = match graph.granularity {
            Granularity::Class => {
                let spread = index
                    .outgoing_refs(id)
                    .iter()
                    .map(|t| package_of(t).to_string())
                    .filter(|p| p != package_of(id))
                    .collect::<std::collections::BTreeSet<_>>()
                    .len() as u64;
                let methods = index
                    .methods_of(id)
                    .iter()
                    .filter(|m| !m.is_constructor && !m.name.starts_with('<'))
                    .count() as u64;
                (spread, methods)
            }
            Granularity::Package | Granularity::Module => {
                let mut spread = std::collections::BTreeSet::new();
                let mut methods = 0u64;
                for class in &index.classes {
                    let belongs = match graph.granularity {
                        Granularity::Package => class.package() == id,
                        _ => {
                            class.location.container_path.as_deref() == Some(id.as_str())
                                || class.location.origin_path.split('/').next() == Some(id.as_str())
                        }
                    };
                    if !belongs {
                        continue;
                    }
                    methods += index
                        .methods_of(class.fqn())
                        .iter()
                        .filter(|m| !m.is_constructor && !m.name.starts_with('<'))
                        .count() as u64;
                    for target in index.outgoing_refs(class.fqn()) {
                        let pkg = package_of(&target).to_string();
                        if pkg != *id {
                            spread.insert(pkg);
                        }
                    }
                }
                (spread.len() as u64, methods)
            }
        };
        values.insert(HotspotMetric::PackageSpread, spread);
        values.insert(HotspotMetric::MethodCount, method_count);
        metrics.insert(id.clone(), values);
    }
    metrics
}

/// Rank nodes per metric, keep the top-N of each, and aggregate.
pub fn compute_hotspots(index: &FactIndex, graph: &GraphAnalysis, top_n: usize) -> HotspotAnalysis {
    let metrics = node_metrics(index, graph);
    let mut aggregated: BTreeMap<String, Vec<HotspotReason>> = BTreeMap::new();

    for &metric in HotspotMetric::all() {
        let mut ranked: Vec<(&String, u64)> = metrics
            .iter()
            .map(|(id, values)| (id, values.get(&metric).copied().unwrap_or(0)))
            .filter(|(_, v)| *v > 0)
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        for (rank0, (id, value)) in ranked.into_iter().take(top_n).enumerate() {
            aggregated.entry(id.clone()).or_default().push(HotspotReason {
                metric,
                value,
                rank: rank0 + 1,
            });
        }
    }

    let mut entries: Vec<HotspotEntry> = aggregated
        .into_iter()
        .map(|(id, reasons)| HotspotEntry { kind: graph.granularity, id, reasons })
        .collect();
    entries.sort_by(|a, b| {
        let max_a = a.reasons.iter().map(|r| r.value).max().unwrap_or(0);
        let max_b = b.reasons.iter().map(|r| r.value).max().unwrap_or(0);
        max_b.cmp(&max_a).then_with(|| a.id.cmp(&b.id))
    });

    HotspotAnalysis { granularity: graph.granularity, entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::facts::{
        ClassFact, DependencyEdge, DependencyKind, OriginKind, SourceLocation, TypeRef,
    };
    use crate::core::graph::analyze_graph;
    use std::collections::BTreeSet;

    fn class(internal: &str) -> ClassFact {
        ClassFact {
            type_ref: TypeRef::from_internal_name(internal),
            access: 0x0001,
            super_type: None,
            interfaces: vec![],
            annotations: BTreeSet::new(),
            has_main_method: false,
            location: SourceLocation {
                kind: OriginKind::DirectoryClass,
                origin_path: format!("out/{}.class", internal),
                container_path: None,
                entry_path: None,
                source_file: None,
                line: None,
            },
        }
    }

    fn edge(from: &str, to: &str) -> DependencyEdge {
        DependencyEdge {
            from_fqn: from.replace('/', "."),
            to: TypeRef::from_internal_name(to),
            kind: DependencyKind::MethodCall,
            detail: None,
            location: SourceLocation {
                kind: OriginKind::DirectoryClass,
                origin_path: "out/x.class".to_string(),
                container_path: None,
                entry_path: None,
                source_file: None,
                line: None,
            },
        }
    }

    #[test]
    fn test_fan_in_ranking() {
        // B and C both depend on A.
        let index = FactIndex::build(
            vec![class("p/A"), class("p/B"), class("p/C")],
            vec![],
            vec![],
            vec![edge("p/B", "p/A"), edge("p/C", "p/A")],
            BTreeSet::new(),
            Default::default(),
        );
        let graph = analyze_graph(&index, Granularity::Class, false);
        let hotspots = compute_hotspots(&index, &graph, 10);
        let top = &hotspots.entries[0];
        assert_eq!(top.id, "p.A");
        let fan_in = top.reasons.iter().find(|r| r.metric == HotspotMetric::FanIn).unwrap();
        assert_eq!(fan_in.value, 2);
        assert_eq!(fan_in.rank, 1);
    }

    #[test]
    fn test_top_n_bounds_each_metric() {
        let classes: Vec<ClassFact> = (0..5).map(|i| class(&format!("p/C{}", i))).collect();
        let edges: Vec<DependencyEdge> =
            (1..5).map(|i| edge(&format!("p/C{}", i), "p/C0")).collect();
        let index =
            FactIndex::build(classes, vec![], vec![], edges, BTreeSet::new(), Default::default());
        let graph = analyze_graph(&index, Granularity::Class, false);
        let hotspots = compute_hotspots(&index, &graph, 2);
        for metric in HotspotMetric::all() {
            let count = hotspots
                .entries
                .iter()
                .flat_map(|e| &e.reasons)
                .filter(|r| r.metric == *metric)
                .count();
            assert!(count <= 2, "metric {:?} ranked {} nodes", metric, count);
        }
    }

    #[test]
    fn test_zero_valued_nodes_do_not_rank() {
        let index = FactIndex::build(
            vec![class("p/A"), class("p/B")],
            vec![],
            vec![],
            vec![],
            BTreeSet::new(),
            Default::default(),
        );
        let graph = analyze_graph(&index, Granularity::Class, false);
        let hotspots = compute_hotspots(&index, &graph, 10);
        assert!(hotspots.entries.is_empty());
    }

    #[test]
    fn test_order_by_max_value_then_id() {
        let index = FactIndex::build(
            vec![class("p/A"), class("p/B"), class("p/C"), class("p/D")],
            vec![],
            vec![],
            vec![
                edge("p/B", "p/A"),
                edge("p/C", "p/A"),
                edge("p/C", "p/D"),
                edge("p/B", "p/D"),
            ],
            BTreeSet::new(),
            Default::default(),
        );
        let graph = analyze_graph(&index, Granularity::Class, false);
        let hotspots = compute_hotspots(&index, &graph, 10);
        let ids: Vec<&str> = hotspots.entries.iter().map(|e| e.id.as_str()).collect();
        // A and D tie on fan-in 2; B and C tie on fan-out 2; all max 2 → id order.
        assert_eq!(ids, vec!["p.A", "p.B", "p.C", "p.D"]);
    }
}
