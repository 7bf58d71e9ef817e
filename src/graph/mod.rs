//! Dependency graph construction and publish ordering

pub mod dependency_graph;
pub mod topo_sort;

pub use dependency_graph::{DependencyGraph, build_graph};
pub use topo_sort::topological_order;
