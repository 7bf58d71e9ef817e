//! Deterministic topological ordering (Kahn's algorithm)
//!
//! Ready nodes are kept in a `BTreeSet`, so whenever several packages are
//! ready at once the lexicographically smallest name is emitted first.

use crate::core::error::CycleDetected;
use crate::graph::dependency_graph::DependencyGraph;
use std::collections::{BTreeMap, BTreeSet};

/// Order every node of `graph` so that dependencies come before dependents.
pub fn topological_order(graph: &DependencyGraph) -> Result<Vec<String>, CycleDetected> {
    let mut indegree: BTreeMap<&str, usize> = graph
        .nodes()
        .map(|name| {
            let count = graph.dependencies_of(name).map_or(0, BTreeSet::len);
            (name, count)
        })
        .collect();

    let mut ready: BTreeSet<&str> = indegree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(name, _)| *name)
        .collect();

    let mut out: Vec<String> = Vec::with_capacity(graph.node_count());

    while let Some(name) = ready.pop_first() {
        out.push(name.to_string());

        if let Some(dependents) = graph.dependents_of(name) {
            for dependent in dependents {
                if let Some(d) = indegree.get_mut(dependent.as_str()) {
                    *d = d.saturating_sub(1);
                    if *d == 0 {
                        ready.insert(dependent.as_str());
                    }
                }
            }
        }
    }

    if out.len() != graph.node_count() {
        let unresolved: BTreeSet<String> = indegree
            .into_iter()
            .filter(|(_, deg)| *deg > 0)
            .map(|(name, _)| name.to_string())
            .collect();
        let cyclic = cyclic_core(graph, &unresolved);

        tracing::debug!(
            "cycle detected: {} unresolved, {} on cycles",
            unresolved.len(),
            cyclic.len()
        );
        return Err(CycleDetected { unresolved, cyclic });
    }

    Ok(out)
}

/// Peel off unresolved nodes that nothing else in the unresolved set depends
/// on; what remains lies on a cycle or between cycles.
fn cyclic_core(graph: &DependencyGraph, unresolved: &BTreeSet<String>) -> BTreeSet<String> {
    let mut remaining = unresolved.clone();

    loop {
        let leaves: Vec<String> = remaining
            .iter()
            .filter(|name| {
                graph
                    .dependents_of(name)
                    .is_none_or(|dependents| dependents.iter().all(|d| !remaining.contains(d)))
            })
            .cloned()
            .collect();

        if leaves.is_empty() {
            return remaining;
        }
        for leaf in leaves {
            remaining.remove(&leaf);
        }
    }
}
