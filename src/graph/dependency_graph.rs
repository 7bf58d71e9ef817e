//! Dependency graph over workspace packages
//!
//! Edges point from a dependent to each of its in-workspace dependencies.
//! Both directions are indexed so that the sorter can decrement dependents
//! and the orchestrator can find everything downstream of a failure.

use crate::core::traits::Package;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    deps_of: BTreeMap<String, BTreeSet<String>>,
    dependents_of: BTreeMap<String, BTreeSet<String>>,
}

/// Build a graph from a name -> dependency-names mapping
///
/// Every key and every referenced dependency becomes a node.
pub fn build_graph(packages: &BTreeMap<String, BTreeSet<String>>) -> DependencyGraph {
    let mut graph = DependencyGraph::default();

    for (name, deps) in packages {
        graph.add_node(name);
        for dep in deps {
            graph.add_edge(name, dep);
        }
    }

    graph
}

impl DependencyGraph {
    pub fn from_packages(packages: &[Package]) -> Self {
        let mapping = packages
            .iter()
            .map(|p| (p.name.clone(), p.dependencies.clone()))
            .collect::<BTreeMap<_, _>>();

        build_graph(&mapping)
    }

    fn add_node(&mut self, name: &str) {
        self.deps_of.entry(name.to_string()).or_default();
        self.dependents_of.entry(name.to_string()).or_default();
    }

    fn add_edge(&mut self, dependent: &str, dependency: &str) {
        self.add_node(dependency);
        self.deps_of
            .entry(dependent.to_string())
            .or_default()
            .insert(dependency.to_string());
        self.dependents_of
            .entry(dependency.to_string())
            .or_default()
            .insert(dependent.to_string());
    }

    /// All node names, sorted
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.deps_of.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.deps_of.contains_key(name)
    }

    pub fn node_count(&self) -> usize {
        self.deps_of.len()
    }

    pub fn edge_count(&self) -> usize {
        self.deps_of.values().map(BTreeSet::len).sum()
    }

    /// Edges as (dependent, dependency) pairs
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.deps_of
            .iter()
            .flat_map(|(name, deps)| deps.iter().map(move |d| (name.as_str(), d.as_str())))
    }

    pub fn dependencies_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.deps_of.get(name)
    }

    pub fn dependents_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.dependents_of.get(name)
    }

    /// Every package that depends on `name`, directly or not
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([name]);

        while let Some(current) = queue.pop_front() {
            if let Some(dependents) = self.dependents_of.get(current) {
                for dependent in dependents {
                    if dependent != name && seen.insert(dependent.clone()) {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        seen
    }
}
