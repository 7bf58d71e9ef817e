//! Version Validator - semver checks for version overrides and registry
//! comparisons
//!
//! # Example
//!
//! ```
//! use workspace_publisher::workspace::VersionValidator;
//!
//! let validator = VersionValidator::new();
//! let version = validator.validate_override("4.3.0-beta.1").unwrap();
//!
//! assert_eq!(version.major, 4);
//! assert!(validator.is_prerelease("4.3.0-beta.1"));
//! ```

use crate::core::error::PublishError;
use semver::Version;
use std::cmp::Ordering;

/// Validator for semantic versions
#[derive(Debug, Default, Clone, Copy)]
pub struct VersionValidator;

impl VersionValidator {
    pub fn new() -> Self {
        Self
    }

    /// Parse a version override given on the command line
    ///
    /// A leading `v` is tolerated since release tags are often written
    /// that way.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::InvalidVersion` when the string is not semver.
    pub fn validate_override(&self, version_str: &str) -> Result<Version, PublishError> {
        let trimmed = version_str.trim();
        let candidate = trimmed.strip_prefix('v').unwrap_or(trimmed);

        Version::parse(candidate).map_err(|e| PublishError::InvalidVersion {
            version: version_str.to_string(),
            message: e.to_string(),
        })
    }

    pub fn is_prerelease(&self, version_str: &str) -> bool {
        Version::parse(version_str).is_ok_and(|v| !v.pre.is_empty())
    }

    /// Compare two versions; `None` if either is not semver
    pub fn compare(&self, v1: &str, v2: &str) -> Option<Ordering> {
        let version1 = Version::parse(v1).ok()?;
        let version2 = Version::parse(v2).ok()?;
        Some(version1.cmp(&version2))
    }

    /// True when `local` is older than what the registry already has
    ///
    /// Such a package can never be published again under that version, so
    /// the health check warns about it.
    pub fn is_behind_registry(&self, local: &str, published: &str) -> bool {
        self.compare(local, published) == Some(Ordering::Less)
    }
}
