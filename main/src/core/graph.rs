use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::api::config::Granularity;
use crate::api::facts::{ClassFact, FactIndex};

/// Representative cycle paths are capped per SCC to keep enumeration bounded
/// on pathological graphs.
const MAX_CYCLE_LEN: usize = 64;

/// Graph analysis result: node table, dense-index edges, SCCs, and one
/// representative cycle per cyclic SCC. Every list is ordered for
/// determinism.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphAnalysis {
    /// Node granularity.
    pub granularity: Granularity,
    /// Node ids, ascending. Edges and SCCs refer to nodes by index.
    pub nodes: Vec<String>,
    /// Deduped directed edges as `[from, to]` index pairs, ascending.
    pub edges: Vec<[usize; 2]>,
    /// Cyclic SCCs (size > 1 or self-loop); node indices ascending within
    /// each, SCCs ordered by their smallest node.
    pub cyclic_sccs: Vec<Vec<usize>>,
    /// One representative cycle per cyclic SCC, as a closed node-index path
    /// (first == last).
    pub cycles: Vec<Vec<usize>>,
}

impl GraphAnalysis {
    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of deduped directed edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edge density: edges over ordered node pairs. Zero for graphs with
    /// fewer than two nodes.
    pub fn density(&self) -> f64 {
        let n = self.nodes.len();
        if n < 2 {
            return 0.0;
        }
        self.edges.len() as f64 / (n * (n - 1)) as f64
    }

    /// Render a cycle as `A -> B -> A` over node ids.
    pub fn cycle_label(&self, cycle: &[usize]) -> String {
        cycle
            .iter()
            .map(|&i| self.nodes[i].as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

fn node_id(class: &ClassFact, granularity: Granularity) -> String {
    match granularity {
        Granularity::Class => class.fqn().to_string(),
        Granularity::Package => class.package().to_string(),
        Granularity::Module => match &class.location.container_path {
            Some(container) => container.clone(),
            None => class
                .location
                .origin_path
                .split('/')
                .next()
                .unwrap_or("")
                .to_string(),
        },
    }
}

/// Build the dependency graph at the configured granularity and run SCC and
/// cycle analysis on it. External buckets are admitted as nodes only when
/// `include_external` is set; references to classes outside the index with
/// no bucket are always dropped. Projected self-edges (e.g. intra-package
/// dependencies) are dropped.
pub fn analyze_graph(
    index: &FactIndex,
    granularity: Granularity,
    include_external: bool,
) -> GraphAnalysis {
    analyze_graph_scoped(index, granularity, include_external, None)
}

/// Like [`analyze_graph`], restricted to classes whose FQN is in `scope`
/// (`None` admits every class).
pub fn analyze_graph_scoped(
    index: &FactIndex,
    granularity: Granularity,
    include_external: bool,
    scope: Option<&BTreeSet<String>>,
) -> GraphAnalysis {
    let admitted = |fqn: &str| scope.map(|s| s.contains(fqn)).unwrap_or(true);

    let mut node_ids: BTreeSet<String> = BTreeSet::new();
    let mut class_node: BTreeMap<String, String> = BTreeMap::new();
    for class in &index.classes {
        if !admitted(class.fqn()) {
            continue;
        }
        let id = node_id(class, granularity);
        class_node.insert(class.fqn().to_string(), id.clone());
        node_ids.insert(id);
    }

    let mut edge_pairs: BTreeSet<(String, String)> = BTreeSet::new();
    for edge in &index.edges {
        let Some(from) = class_node.get(&edge.from_fqn) else { continue };
        let to = if let Some(project_node) = class_node.get(&edge.to.fqn) {
            project_node.clone()
        } else if include_external {
            match index.external_bucket(&edge.to.fqn) {
                Some(bucket) => format!("__external__:{}", bucket),
                None => continue,
            }
        } else {
            continue;
        };
        if *from == to {
            continue;
        }
        node_ids.insert(to.clone());
        edge_pairs.insert((from.clone(), to));
    }

    let nodes: Vec<String> = node_ids.into_iter().collect();
    let index_of: BTreeMap<&str, usize> =
        nodes.iter().enumerate().map(|(i, n)| (n.as_str(), i)).collect();

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut edges: Vec<[usize; 2]> = Vec::with_capacity(edge_pairs.len());
    for (from, to) in &edge_pairs {
        let f = index_of[from.as_str()];
        let t = index_of[to.as_str()];
        adjacency[f].push(t);
        edges.push([f, t]);
    }
    edges.sort();
    for targets in &mut adjacency {
        targets.sort();
    }

    // Self-edges were dropped above, so a single-node SCC is acyclic.
    let mut cyclic_sccs: Vec<Vec<usize>> = tarjan_sccs(&adjacency)
        .into_iter()
        .filter(|scc| scc.len() > 1)
        .collect();
    for scc in &mut cyclic_sccs {
        scc.sort();
    }
    cyclic_sccs.sort();

    let cycles: Vec<Vec<usize>> = cyclic_sccs
        .iter()
        .filter_map(|scc| representative_cycle(&adjacency, scc))
        .collect();

    GraphAnalysis { granularity, nodes, edges, cyclic_sccs, cycles }
}

/// Iterative Tarjan strongly-connected components over an adjacency list.
pub fn tarjan_sccs(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adjacency.len();
    let mut index_counter = 0usize;
    let mut indices: Vec<Option<usize>> = vec![None; n];
    let mut lowlink: Vec<usize> = vec![0; n];
    let mut on_stack: Vec<bool> = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut sccs: Vec<Vec<usize>> = Vec::new();

    // Explicit DFS frames: (node, next child position).
    let mut frames: Vec<(usize, usize)> = Vec::new();

    for start in 0..n {
        if indices[start].is_some() {
            continue;
        }
        frames.push((start, 0));
        indices[start] = Some(index_counter);
        lowlink[start] = index_counter;
        index_counter += 1;
        stack.push(start);
        on_stack[start] = true;

        while let Some(&mut (v, ref mut child_pos)) = frames.last_mut() {
            if *child_pos < adjacency[v].len() {
                let w = adjacency[v][*child_pos];
                *child_pos += 1;
                match indices[w] {
                    None => {
                        indices[w] = Some(index_counter);
                        lowlink[w] = index_counter;
                        index_counter += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        frames.push((w, 0));
                    }
                    Some(w_index) => {
                        if on_stack[w] {
                            lowlink[v] = lowlink[v].min(w_index);
                        }
                    }
                }
            } else {
                frames.pop();
                if let Some(&(parent, _)) = frames.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
                if lowlink[v] == indices[v].expect("visited") {
                    let mut scc = Vec::new();
                    loop {
                        let w = stack.pop().expect("tarjan stack underflow");
                        on_stack[w] = false;
                        scc.push(w);
                        if w == v {
                            break;
                        }
                    }
                    sccs.push(scc);
                }
            }
        }
    }
    sccs
}

/// Extract one representative cycle inside an SCC via bounded DFS from its
/// smallest node. Returns a closed path (first == last) or `None` when the
/// cap is hit before closing.
fn representative_cycle(adjacency: &[Vec<usize>], scc: &[usize]) -> Option<Vec<usize>> {
    let members: BTreeSet<usize> = scc.iter().copied().collect();
    let start = *scc.first()?;

    let mut path = vec![start];
    let mut visited: BTreeSet<usize> = BTreeSet::new();
    visited.insert(start);
    // DFS frames: child position per path node.
    let mut positions = vec![0usize];

    while let Some(&current) = path.last() {
        let pos = positions.last_mut().expect("positions track path");
        let targets = &adjacency[current];
        if *pos >= targets.len() {
            path.pop();
            positions.pop();
            if path.is_empty() {
                return None;
            }
            continue;
        }
        let next = targets[*pos];
        *pos += 1;
        if next == start && path.len() > 1 {
            path.push(start);
            return Some(path);
        }
        if next == start && members.len() == 1 {
            // Self-loop SCC.
            path.push(start);
            return Some(path);
        }
        if members.contains(&next) && !visited.contains(&next) && path.len() < MAX_CYCLE_LEN {
            visited.insert(next);
            path.push(next);
            positions.push(0);
        }
    }
    None
}
