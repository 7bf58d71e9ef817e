//! Orchestration layer for workspace publishing
//!
//! Plans the publish order once, then walks it sequentially against a
//! registry client and reports the outcome of every package.

pub mod publish_plan;
pub mod report;
pub mod workspace_publisher;

pub use publish_plan::PublishPlan;
pub use report::PublishRunReport;
pub use workspace_publisher::{PublishRunOptions, WorkspacePublisher};
