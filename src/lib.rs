pub mod core;
pub mod graph;
pub mod orchestration;
pub mod registry;
pub mod workspace;

pub use self::core::*;
pub use graph::{DependencyGraph, build_graph, topological_order};
pub use orchestration::{PublishPlan, PublishRunOptions, PublishRunReport, WorkspacePublisher};
pub use registry::{CargoRegistry, CommandError, SafeCommandExecutor};
pub use workspace::{CargoWorkspace, VersionValidator};
