//! Configuration structures and types for workspace-publisher
//!
//! This module provides type-safe configuration management with serde support.

use crate::core::retry::RetryOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Default pause after each real publish, giving the registry index time to
/// pick up the new version.
pub const DEFAULT_PROPAGATION_DELAY_SECS: u64 = 16;

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishConfig {
    /// Schema version
    #[serde(default = "default_config_version")]
    pub version: String,

    /// Extend from base configuration file (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    /// Workspace member selection
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Publish behaviour
    #[serde(default)]
    pub publish: PublishSettings,

    /// Registry query retries
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Which workspace members take part in publishing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceConfig {
    /// Only members whose path starts with one of these prefixes are
    /// published (empty: every member)
    #[serde(default)]
    pub member_prefixes: Vec<String>,

    /// Members published regardless of `member_prefixes`
    #[serde(default)]
    pub extra_members: Vec<String>,

    /// Count `[dev-dependencies]` path entries as ordering edges
    #[serde(default = "default_true")]
    pub include_dev_dependencies: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            member_prefixes: Vec::new(),
            extra_members: Vec::new(),
            include_dev_dependencies: true,
        }
    }
}

/// What to do with dependents of a package that failed to publish
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum FailurePolicy {
    /// Still attempt dependents and let the registry reject them
    #[default]
    Attempt,
    /// Mark every transitive dependent as failed without attempting it
    SkipDependents,
}

/// Publish behaviour settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishSettings {
    /// Per-package feature lists (package name -> "feat-a,feat-b")
    #[serde(default)]
    pub features: BTreeMap<String, String>,

    /// Seconds to wait after each real publish
    #[serde(default = "default_propagation_delay_secs")]
    pub propagation_delay_secs: u64,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Alternative cargo registry name (`--registry`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    /// Extra environment variables for cargo invocations
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Timeout for a single cargo invocation, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
}

impl PublishSettings {
    pub fn propagation_delay(&self) -> Duration {
        Duration::from_secs(self.propagation_delay_secs)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            features: BTreeMap::new(),
            propagation_delay_secs: DEFAULT_PROPAGATION_DELAY_SECS,
            failure_policy: FailurePolicy::default(),
            registry: None,
            env: BTreeMap::new(),
            command_timeout_secs: None,
        }
    }
}

/// Retry settings for registry queries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl From<&RetryConfig> for RetryOptions {
    fn from(config: &RetryConfig) -> Self {
        RetryOptions {
            max_attempts: config.max_attempts,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            version: default_config_version(),
            extends: None,
            workspace: WorkspaceConfig::default(),
            publish: PublishSettings::default(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_config_version() -> String {
    "1.0".to_string()
}

fn default_true() -> bool {
    true
}

fn default_propagation_delay_secs() -> u64 {
    DEFAULT_PROPAGATION_DELAY_SECS
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PublishConfig::default();

        assert_eq!(config.version, "1.0");
        assert!(config.workspace.member_prefixes.is_empty());
        assert!(config.workspace.include_dev_dependencies);
        assert_eq!(config.publish.propagation_delay(), Duration::from_secs(16));
        assert_eq!(config.publish.failure_policy, FailurePolicy::Attempt);
        assert_eq!(config.publish.command_timeout(), None);
    }

    #[test]
    fn test_deserialize_yaml() {
        let yaml = r#"
version: "1.0"
workspace:
  memberPrefixes: ["lib/"]
  extraMembers: ["tests/lib/wast"]
publish:
  propagationDelaySecs: 5
  failurePolicy: skipDependents
  features:
    my-cli: "default,cranelift"
  env:
    MY_PUBLISH_SCRIPT_IS_RUNNING: "1"
"#;

        let config: PublishConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.workspace.member_prefixes, vec!["lib/"]);
        assert_eq!(config.workspace.extra_members, vec!["tests/lib/wast"]);
        assert!(config.workspace.include_dev_dependencies);
        assert_eq!(config.publish.propagation_delay_secs, 5);
        assert_eq!(config.publish.failure_policy, FailurePolicy::SkipDependents);
        assert_eq!(
            config.publish.features.get("my-cli").map(String::as_str),
            Some("default,cranelift")
        );
        assert_eq!(config.publish.env.len(), 1);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_retry_config_into_options() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay_ms: 250,
            max_delay_ms: 4_000,
            backoff_multiplier: 1.5,
        };

        let options = RetryOptions::from(&config);

        assert_eq!(options.max_attempts, 5);
        assert_eq!(options.initial_delay, Duration::from_millis(250));
        assert_eq!(options.max_delay, Duration::from_secs(4));
        assert_eq!(options.backoff_multiplier, 1.5);
    }
}
