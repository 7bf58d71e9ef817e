//! Error handling for workspace publishing
//!
//! This module provides the error types shared by the planner, the manifest
//! reader and the registry client, using the thiserror crate.

use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

/// The dependency graph could not be ordered because it contains a cycle.
///
/// `unresolved` holds every package that never became ready. `cyclic` is the
/// subset that sits on (or between) cycles, with packages that merely depend
/// on a cycle peeled away.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("dependency cycle detected among: {}", join_names(.cyclic))]
pub struct CycleDetected {
    pub unresolved: BTreeSet<String>,
    pub cyclic: BTreeSet<String>,
}

fn join_names(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

/// Main error type for workspace publishing operations
#[derive(Error, Debug)]
pub enum PublishError {
    // Planning errors
    #[error(transparent)]
    CycleDetected(#[from] CycleDetected),

    #[error("`{package}` is not a workspace package")]
    UnknownPackage { package: String },

    // Manifest errors
    #[error("failed to read manifest {}: {message}", .path.display())]
    ManifestError { path: PathBuf, message: String },

    #[error("invalid version `{version}`: {message}")]
    InvalidVersion { version: String, message: String },

    // Configuration errors
    #[error("configuration error: {0}")]
    ConfigError(String),

    // Registry errors
    #[error("[{package}] registry query failed: {message}")]
    RegistryQueryFailed { package: String, message: String },

    #[error("[{package}] publish failed: {message}")]
    PublishFailed { package: String, message: String },

    #[error("[{package}] dependency `{dependency}` failed to publish")]
    DependencyFailed { package: String, dependency: String },

    // State errors
    #[error("[{package}] invalid state transition: {from} -> {to}")]
    InvalidTransition {
        package: String,
        from: String,
        to: String,
    },

    // Command execution errors
    #[error("command execution error: {0}")]
    CommandError(#[from] crate::registry::command_executor::CommandError),
}

impl PublishError {
    /// Check if this error is recoverable by re-running the publish
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::CycleDetected(_)
                | Self::UnknownPackage { .. }
                | Self::ManifestError { .. }
                | Self::InvalidVersion { .. }
                | Self::ConfigError(_)
                | Self::InvalidTransition { .. }
        )
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::CycleDetected(_) => vec![
                "Break the dependency cycle between the listed packages",
                "Run `health-check --print-dependencies` to inspect the graph",
            ],
            Self::UnknownPackage { .. } => {
                vec!["Check that the package is a member of the workspace"]
            }
            Self::ManifestError { .. } => vec![
                "Check that the manifest exists and is valid TOML",
                "Check the `[workspace] members` list",
            ],
            Self::InvalidVersion { .. } => {
                vec!["Use a SemVer version (e.g. 1.0.0)"]
            }
            Self::ConfigError(_) => vec!["Check .publish-config.yaml"],
            Self::RegistryQueryFailed { .. } => vec![
                "Check your network connection",
                "Re-run the publish; already published packages are skipped",
            ],
            Self::PublishFailed { .. } => vec![
                "Inspect the cargo output above",
                "Re-run the publish; already published packages are skipped",
            ],
            Self::DependencyFailed { .. } => {
                vec!["Fix the failing dependency first, then re-run the publish"]
            }
            Self::InvalidTransition { .. } => vec!["Report this as a bug"],
            Self::CommandError(_) => vec![
                "Check that cargo is installed and on PATH",
                "Check the package directory exists",
            ],
        }
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::CycleDetected(_) => "CYCLE_DETECTED",
            Self::UnknownPackage { .. } => "UNKNOWN_PACKAGE",
            Self::ManifestError { .. } => "MANIFEST_ERROR",
            Self::InvalidVersion { .. } => "INVALID_VERSION",
            Self::ConfigError(_) => "CONFIG_ERROR",
            Self::RegistryQueryFailed { .. } => "REGISTRY_QUERY_FAILED",
            Self::PublishFailed { .. } => "PUBLISH_FAILED",
            Self::DependencyFailed { .. } => "DEPENDENCY_FAILED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::CommandError(_) => "COMMAND_ERROR",
        }
    }
}
