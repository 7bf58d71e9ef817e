//! Core traits and types for workspace publishing
//!
//! This module defines the package descriptor and the two collaborator
//! interfaces the orchestrator depends on: a manifest source that lists the
//! workspace packages, and a registry client that queries and publishes them.

use crate::core::error::PublishError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

// ============================================================================
// Package
// ============================================================================

/// One publishable workspace package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    /// Package name, unique within the workspace
    pub name: String,

    /// Version declared by the package's own manifest
    pub version: String,

    /// Names of the in-workspace packages this package depends on
    #[serde(default)]
    pub dependencies: BTreeSet<String>,

    /// Feature list passed only when this package is published
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_extra_args: Option<String>,

    /// Path to the package's manifest
    pub manifest_path: PathBuf,
}

impl Package {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let name = name.into();
        let manifest_path = PathBuf::from(&name).join("Cargo.toml");
        Self {
            name,
            version: version.into(),
            dependencies: BTreeSet::new(),
            publish_extra_args: None,
            manifest_path,
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extra_args(mut self, extra_args: impl Into<String>) -> Self {
        self.publish_extra_args = Some(extra_args.into());
        self
    }

    pub fn with_manifest_path(mut self, manifest_path: impl Into<PathBuf>) -> Self {
        self.manifest_path = manifest_path.into();
        self
    }

    /// Directory containing the package's manifest
    pub fn directory(&self) -> &Path {
        match self.manifest_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Source of workspace package descriptors
///
/// Implementations must resolve local dependencies to canonical package names
/// (rename targets, not aliases) and must only report dependencies that are
/// themselves part of the returned package set.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    async fn list_workspace_packages(&self) -> Result<Vec<Package>, PublishError>;
}

/// Registry client used by the orchestrator
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Registry name (e.g., "crates-io")
    fn name(&self) -> &str;

    /// Most recent published version visible to the registry's query index.
    ///
    /// The result may lag a fresh publish by the registry's propagation delay.
    async fn latest_published_version(&self, package: &str)
    -> Result<Option<String>, PublishError>;

    /// Publish a package
    ///
    /// # Arguments
    ///
    /// * `package` - The package to publish
    /// * `extra_args` - Feature list for this package, if any
    /// * `dry_run` - Validate only, without making the package visible
    async fn publish(
        &self,
        package: &Package,
        extra_args: Option<&str>,
        dry_run: bool,
    ) -> Result<(), PublishError>;
}
