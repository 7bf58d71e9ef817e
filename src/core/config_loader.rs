//! Configuration file loader for workspace-publisher
//!
//! This module provides configuration loading, validation, and merging capabilities.

use super::config::*;
use crate::core::error::PublishError;
use serde_yaml::Value;
use std::collections::HashMap;
use std::env;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;

/// Configuration file name
pub const CONFIG_FILENAME: &str = ".publish-config.yaml";

/// Supported schema versions
const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

/// Maximum depth of `extends` chains
const MAX_EXTENDS_DEPTH: usize = 8;

/// Configuration load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Project path to load config from
    pub project_path: PathBuf,

    /// Also read `~/.publish-config.yaml` (lower priority than the project file)
    pub include_global: bool,

    /// Environment variables
    pub env: HashMap<String, String>,
}

impl ConfigLoadOptions {
    /// Options for a project, reading the process environment
    pub fn for_project<P: Into<PathBuf>>(project_path: P) -> Self {
        Self {
            project_path: project_path.into(),
            include_global: true,
            env: env::vars().collect(),
        }
    }
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    pub valid: bool,
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "publish.features.my-cli")
    pub field: String,
    pub message: String,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Configuration file loader
pub struct ConfigLoader;

type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<Value>, PublishError>> + Send + 'a>>;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. Environment variables
    /// 2. Project config (./.publish-config.yaml)
    /// 3. Global config (~/.publish-config.yaml)
    /// 4. Default values
    ///
    /// CLI flags are applied on top by the caller.
    pub async fn load(options: ConfigLoadOptions) -> Result<PublishConfig, PublishError> {
        let mut merged = Value::Mapping(Default::default());

        if options.include_global
            && let Some(home) = options.env.get("HOME")
        {
            let global_path = PathBuf::from(home).join(CONFIG_FILENAME);
            if let Some(global) = Self::load_config_file(&global_path, 0).await? {
                Self::merge_values(&mut merged, global);
            }
        }

        let project_path = options.project_path.join(CONFIG_FILENAME);
        if let Some(project) = Self::load_config_file(&project_path, 0).await? {
            Self::merge_values(&mut merged, project);
        }

        let mut config: PublishConfig = serde_yaml::from_value(merged)
            .map_err(|e| PublishError::ConfigError(format!("Invalid configuration: {}", e)))?;

        Self::apply_env_overrides(&mut config, &options.env)?;

        Ok(config)
    }

    /// Load a YAML file, resolving its `extends` chain
    fn load_config_file(file_path: &Path, depth: usize) -> LoadFuture<'_> {
        Box::pin(async move {
            if !file_path.exists() {
                return Ok(None);
            }
            if depth >= MAX_EXTENDS_DEPTH {
                return Err(PublishError::ConfigError(format!(
                    "`extends` chain deeper than {} at {}",
                    MAX_EXTENDS_DEPTH,
                    file_path.display()
                )));
            }

            let content = fs::read_to_string(file_path).await.map_err(|e| {
                PublishError::ConfigError(format!("Failed to read config file: {}", e))
            })?;

            let value: Value = serde_yaml::from_str(&content).map_err(|e| {
                PublishError::ConfigError(format!("Failed to parse YAML config: {}", e))
            })?;

            let value = match value {
                Value::Null => Value::Mapping(Default::default()),
                other => other,
            };

            let extends = value
                .get("extends")
                .and_then(Value::as_str)
                .map(str::to_string);

            let Some(extends) = extends else {
                return Ok(Some(value));
            };

            let base_path = file_path
                .parent()
                .ok_or_else(|| PublishError::ConfigError("Invalid config file path".to_string()))?
                .join(&extends);

            let mut base = Self::load_config_file(&base_path, depth + 1)
                .await?
                .ok_or_else(|| {
                    PublishError::ConfigError(format!(
                        "Base config not found: {}",
                        base_path.display()
                    ))
                })?;

            Self::merge_values(&mut base, value);
            Ok(Some(base))
        })
    }

    /// Deep-merge `source` into `target`; mappings merge key by key, every
    /// other value in `source` replaces the one in `target`.
    fn merge_values(target: &mut Value, source: Value) {
        match (target, source) {
            (Value::Mapping(target_map), Value::Mapping(source_map)) => {
                for (key, value) in source_map {
                    match target_map.get_mut(&key) {
                        Some(existing) => Self::merge_values(existing, value),
                        None => {
                            target_map.insert(key, value);
                        }
                    }
                }
            }
            (target, source) => *target = source,
        }
    }

    /// Apply environment variable overrides
    ///
    /// - `PUBLISH_REGISTRY` -> publish.registry
    /// - `PUBLISH_PROPAGATION_DELAY_SECS` -> publish.propagationDelaySecs
    /// - `PUBLISH_STRICT=true` -> publish.failurePolicy = skipDependents
    fn apply_env_overrides(
        config: &mut PublishConfig,
        env: &HashMap<String, String>,
    ) -> Result<(), PublishError> {
        if let Some(registry) = env.get("PUBLISH_REGISTRY").filter(|r| !r.is_empty()) {
            config.publish.registry = Some(registry.clone());
        }

        if let Some(delay) = env.get("PUBLISH_PROPAGATION_DELAY_SECS") {
            config.publish.propagation_delay_secs = delay.trim().parse().map_err(|_| {
                PublishError::ConfigError(format!(
                    "PUBLISH_PROPAGATION_DELAY_SECS must be a number of seconds, got `{}`",
                    delay
                ))
            })?;
        }

        if env.get("PUBLISH_STRICT").map(|s| s.as_str()) == Some("true") {
            config.publish.failure_policy = FailurePolicy::SkipDependents;
        }

        Ok(())
    }

    /// Validate a loaded configuration
    pub fn validate(config: &PublishConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if config.version.is_empty() {
            errors.push(ConfigValidationError {
                field: "version".to_string(),
                message: "Version is required".to_string(),
            });
        } else if !SUPPORTED_VERSIONS.contains(&config.version.as_str()) {
            warnings.push(ConfigValidationWarning {
                field: "version".to_string(),
                message: format!("Unknown config version `{}`", config.version),
                suggestion: Some(format!("Use one of: {}", SUPPORTED_VERSIONS.join(", "))),
            });
        }

        for (package, features) in &config.publish.features {
            if features.trim().is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("publish.features.{}", package),
                    message: "Feature list is empty".to_string(),
                });
            }
        }

        if config.retry.max_attempts == 0 {
            errors.push(ConfigValidationError {
                field: "retry.maxAttempts".to_string(),
                message: "At least one attempt is required".to_string(),
            });
        }

        let multiplier = config.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            errors.push(ConfigValidationError {
                field: "retry.backoffMultiplier".to_string(),
                message: format!("Backoff multiplier must be a number >= 1.0, got {}", multiplier),
            });
        }

        if config.publish.propagation_delay_secs == 0 {
            warnings.push(ConfigValidationWarning {
                field: "publish.propagationDelaySecs".to_string(),
                message: "No pause between publishes".to_string(),
                suggestion: Some(
                    "Dependents may be rejected until the registry index catches up".to_string(),
                ),
            });
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Format validation result as human-readable string
    pub fn format_validation_result(result: &ConfigValidationResult) -> String {
        let mut lines = Vec::new();

        if result.valid {
            lines.push("✅ Configuration is valid".to_string());
        } else {
            lines.push("❌ Configuration has errors".to_string());
        }

        if !result.errors.is_empty() {
            lines.push("\n🔴 Errors:".to_string());
            for error in &result.errors {
                lines.push(format!("  - [{}] {}", error.field, error.message));
            }
        }

        if !result.warnings.is_empty() {
            lines.push("\n🟡 Warnings:".to_string());
            for warning in &result.warnings {
                lines.push(format!("  - [{}] {}", warning.field, warning.message));
                if let Some(suggestion) = &warning.suggestion {
                    lines.push(format!("    💡 {}", suggestion));
                }
            }
        }

        lines.join("\n")
    }
}
