use std::collections::BTreeSet;

use crate::api::config::Granularity;
use crate::api::traits::{EvalContext, Rule};
use crate::api::types::{Finding, RuleFailure, RuleId};
use crate::core::graph::{analyze_graph_scoped, GraphAnalysis};
use crate::core::params::{ParamError, ParamReader};

/// All rules of the `graph` group.
pub fn rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(NoCycles),
        Box::new(MaxCycles),
        Box::new(MaxEdgeCount),
        Box::new(MaxDependencyDensity),
    ]
}

fn read_granularity(params: &ParamReader<'_>) -> Result<Granularity, ParamError> {
    Ok(params
        .optional_enum("granularity", Granularity::parse, "CLASS|PACKAGE|MODULE")?
        .unwrap_or(Granularity::Class))
}

/// Build the analysis graph over the classes this rule's scope admits.
fn scoped_graph(ctx: &EvalContext<'_>, params: &ParamReader<'_>) -> Result<GraphAnalysis, ParamError> {
    let granularity = read_granularity(params)?;
    let include_external = params.optional_bool("includeExternal")?.unwrap_or(false);
    let scope: BTreeSet<String> = ctx.in_scope.iter().cloned().collect();
    Ok(analyze_graph_scoped(ctx.index, granularity, include_external, Some(&scope)))
}

/// Anchor a cycle finding at its first node when the graph is class-grained,
/// at the project otherwise.
fn cycle_finding(ctx: &EvalContext<'_>, graph: &GraphAnalysis, cycle: &[usize]) -> Finding {
    let label = graph.cycle_label(cycle);
    let size = cycle.len().saturating_sub(1);
    let message = format!("Dependency cycle detected: {}", label);
    let finding = match graph.granularity {
        Granularity::Class => {
            let first = &graph.nodes[cycle[0]];
            match ctx.index.class(first) {
                Some(class) => ctx.finding_for_class(class, message),
                None => ctx.finding_for_project(message),
            }
        }
        _ => ctx.finding_for_project(message),
    };
    finding
        .with_data("cycle", label)
        .with_data("size", size.to_string())
}

/// `graph.noCycles`: any cycle is a finding.
pub struct NoCycles;

impl Rule for NoCycles {
    fn id(&self) -> RuleId {
        RuleId::from("graph.noCycles")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let graph = scoped_graph(ctx, &params)?;
        Ok(graph
            .cycles
            .iter()
            .map(|cycle| cycle_finding(ctx, &graph, cycle))
            .collect())
    }
}

/// `graph.maxCycles`: cap on the number of cyclic SCCs.
pub struct MaxCycles;

impl Rule for MaxCycles {
    fn id(&self) -> RuleId {
        RuleId::from("graph.maxCycles")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let max = params.require_non_negative_int("max")?;
        let graph = scoped_graph(ctx, &params)?;
        let count = graph.cyclic_sccs.len() as u64;
        if count > max {
            return Ok(vec![ctx
                .finding_for_project(format!(
                    "Dependency graph has {} cycles, limit is {}",
                    count, max
                ))
                .with_data("count", count.to_string())
                .with_data("max", max.to_string())]);
        }
        Ok(vec![])
    }
}

/// `graph.maxEdgeCount`: cap on deduped directed edges.
pub struct MaxEdgeCount;

impl Rule for MaxEdgeCount {
    fn id(&self) -> RuleId {
        RuleId::from("graph.maxEdgeCount")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let max = params.require_non_negative_int("max")?;
        let graph = scoped_graph(ctx, &params)?;
        let count = graph.edge_count() as u64;
        if count > max {
            return Ok(vec![ctx
                .finding_for_project(format!(
                    "Dependency graph has {} edges, limit is {}",
                    count, max
                ))
                .with_data("count", count.to_string())
                .with_data("max", max.to_string())]);
        }
        Ok(vec![])
    }
}

/// `graph.maxDependencyDensity`: cap on edges over ordered node pairs.
pub struct MaxDependencyDensity;

impl Rule for MaxDependencyDensity {
    fn id(&self) -> RuleId {
        RuleId::from("graph.maxDependencyDensity")
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<Vec<Finding>, RuleFailure> {
        let params = ParamReader::new(&ctx.rule.params, "params");
        let max = params.require_f64("max")?;
        let graph = scoped_graph(ctx, &params)?;
        let density = graph.density();
        if density > max {
            return Ok(vec![ctx
                .finding_for_project(format!(
                    "Dependency density {:.6} exceeds limit {:.6}",
                    density, max
                ))
                .with_data("density", format!("{:.6}", density))
                .with_data("max", format!("{:.6}", max))]);
        }
        Ok(vec![])
    }
}
