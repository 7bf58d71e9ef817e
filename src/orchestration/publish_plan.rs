//! Publish plan: the package snapshot, its graph and the order to walk

use crate::core::error::PublishError;
use crate::core::traits::{ManifestSource, Package};
use crate::graph::{DependencyGraph, topological_order};
use serde::Serialize;
use std::collections::BTreeMap;

/// Everything a publish run needs, computed once before any registry call
#[derive(Debug, Clone, Serialize)]
pub struct PublishPlan {
    /// Dependencies before dependents
    pub order: Vec<String>,
    pub packages: BTreeMap<String, Package>,
    #[serde(skip)]
    pub graph: DependencyGraph,
}

impl PublishPlan {
    /// Build the graph and order for a package snapshot
    ///
    /// # Errors
    ///
    /// `PublishError::CycleDetected` when the local dependencies form a cycle.
    pub fn from_packages(packages: Vec<Package>) -> Result<Self, PublishError> {
        let graph = DependencyGraph::from_packages(&packages);
        let order = topological_order(&graph)?;

        tracing::debug!(
            "planned {} packages with {} local dependency edges",
            graph.node_count(),
            graph.edge_count()
        );

        let packages = packages
            .into_iter()
            .map(|package| (package.name.clone(), package))
            .collect();

        Ok(Self {
            order,
            packages,
            graph,
        })
    }

    /// List the packages of `source` and plan them
    pub async fn from_source(source: &dyn ManifestSource) -> Result<Self, PublishError> {
        let packages = source.list_workspace_packages().await?;
        Self::from_packages(packages)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Print the order, optionally with each package's local dependencies
    pub fn print(&self, with_dependencies: bool) {
        println!("\n📦 Publish order ({} packages):", self.len());
        for (index, name) in self.order.iter().enumerate() {
            let version = self
                .packages
                .get(name)
                .map(|p| p.version.as_str())
                .unwrap_or("?");
            println!("  {:>3}. {} {}", index + 1, name, version);

            if with_dependencies
                && let Some(deps) = self.graph.dependencies_of(name)
                && !deps.is_empty()
            {
                let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
                println!("       depends on: {}", deps.join(", "));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticSource(Vec<Package>);

    #[async_trait]
    impl ManifestSource for StaticSource {
        async fn list_workspace_packages(&self) -> Result<Vec<Package>, PublishError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_plan_orders_dependencies_first() {
        let plan = PublishPlan::from_packages(vec![
            Package::new("app", "1.0.0").with_dependencies(["lib"]),
            Package::new("lib", "1.0.0").with_dependencies(["types"]),
            Package::new("types", "1.0.0"),
        ])
        .unwrap();

        assert_eq!(plan.order, vec!["types", "lib", "app"]);
        assert_eq!(plan.len(), 3);
        assert!(plan.packages.contains_key("lib"));
    }

    #[test]
    fn test_plan_rejects_cycles() {
        let result = PublishPlan::from_packages(vec![
            Package::new("a", "1.0.0").with_dependencies(["b"]),
            Package::new("b", "1.0.0").with_dependencies(["a"]),
        ]);

        match result {
            Err(PublishError::CycleDetected(cycle)) => {
                assert_eq!(cycle.cyclic.len(), 2);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_plan_from_source() {
        let source = StaticSource(vec![
            Package::new("b", "0.1.0"),
            Package::new("a", "0.1.0"),
        ]);

        let plan = PublishPlan::from_source(&source).await.unwrap();

        assert_eq!(plan.order, vec!["a", "b"]);
        assert!(!plan.is_empty());
    }
}
