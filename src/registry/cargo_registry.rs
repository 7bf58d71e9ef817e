//! Cargo registry client - queries and publishes through the `cargo` CLI

use crate::core::config::PublishSettings;
use crate::core::error::PublishError;
use crate::core::retry::{RetryManager, RetryOptions};
use crate::core::traits::{Package, RegistryClient};
use crate::registry::command_executor::SafeCommandExecutor;
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Registry client backed by `cargo search` and `cargo publish`
#[derive(Debug, Clone)]
pub struct CargoRegistry {
    workspace_root: PathBuf,
    registry: Option<String>,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
    retry: RetryManager,
}

impl CargoRegistry {
    pub fn new<P: Into<PathBuf>>(workspace_root: P) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            registry: None,
            env: BTreeMap::new(),
            timeout: None,
            retry: RetryManager::new(RetryOptions::default()),
        }
    }

    /// Build a client from publish settings and retry options
    pub fn from_settings<P: Into<PathBuf>>(
        workspace_root: P,
        settings: &PublishSettings,
        retry: RetryOptions,
    ) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            registry: settings.registry.clone(),
            env: settings.env.clone(),
            timeout: settings.command_timeout(),
            retry: RetryManager::new(retry),
        }
    }

    fn executor(&self, dir: &Path) -> Result<SafeCommandExecutor, PublishError> {
        let mut executor = SafeCommandExecutor::new(dir)?;
        if let Some(timeout) = self.timeout {
            executor.set_timeout(timeout);
        }
        executor.set_env(self.env.clone());
        Ok(executor)
    }

    async fn search_once(&self, package: &str) -> Result<Option<String>, PublishError> {
        let executor = self.executor(&self.workspace_root)?;
        let args = search_args(package, self.registry.as_deref());
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let output = executor.execute("cargo", &args).await?;
        if !output.status.success() {
            return Err(PublishError::RegistryQueryFailed {
                package: package.to_string(),
                message: stderr_tail(&output.stderr),
            });
        }

        Ok(parse_search_output(
            package,
            &String::from_utf8_lossy(&output.stdout),
        ))
    }
}

#[async_trait]
impl RegistryClient for CargoRegistry {
    fn name(&self) -> &str {
        self.registry.as_deref().unwrap_or("crates-io")
    }

    async fn latest_published_version(
        &self,
        package: &str,
    ) -> Result<Option<String>, PublishError> {
        self.retry.retry(|| self.search_once(package)).await
    }

    async fn publish(
        &self,
        package: &Package,
        extra_args: Option<&str>,
        dry_run: bool,
    ) -> Result<(), PublishError> {
        let executor = self.executor(package.directory())?;
        let args = publish_args(extra_args, self.registry.as_deref(), dry_run);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        tracing::info!("$ cargo {}", args.join(" "));
        let output = executor.execute("cargo", &args).await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(PublishError::PublishFailed {
                package: package.name.clone(),
                message: stderr_tail(&output.stderr),
            })
        }
    }
}

fn search_args(package: &str, registry: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "search".to_string(),
        package.to_string(),
        "--limit".to_string(),
        "1".to_string(),
    ];
    if let Some(registry) = registry {
        args.push("--registry".to_string());
        args.push(registry.to_string());
    }
    args
}

fn publish_args(extra_args: Option<&str>, registry: Option<&str>, dry_run: bool) -> Vec<String> {
    let mut args = vec!["publish".to_string()];
    if dry_run {
        args.push("--dry-run".to_string());
    }
    if let Some(features) = extra_args {
        args.push("--features".to_string());
        args.push(features.to_string());
    }
    if let Some(registry) = registry {
        args.push("--registry".to_string());
        args.push(registry.to_string());
    }
    args
}

/// Find `<name> = "<version>"` in `cargo search` output
fn parse_search_output(package: &str, stdout: &str) -> Option<String> {
    let pattern = format!(r#"^{} = "([^"]+)""#, regex::escape(package));
    let re = Regex::new(&pattern).ok()?;

    stdout
        .lines()
        .find_map(|line| re.captures(line).map(|cap| cap[1].to_string()))
}

/// Last few non-empty lines of stderr, which is where cargo reports errors
fn stderr_tail(stderr: &[u8]) -> String {
    const MAX_LINES: usize = 5;

    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(MAX_LINES);
    let tail = lines[start..].join("\n");

    if tail.is_empty() {
        "cargo exited with a non-zero status".to_string()
    } else {
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_search_output_exact_match() {
        let stdout = r#"wasmer-types = "4.2.5"    # Wasmer Common Types
wasmer-types-fork = "0.1.0"    # fork
... and 12 crates more (use --limit N to see more)
"#;

        assert_eq!(
            parse_search_output("wasmer-types", stdout),
            Some("4.2.5".to_string())
        );
    }

    #[test]
    fn test_parse_search_output_ignores_prefix_matches() {
        let stdout = "wasmer-types-fork = \"0.1.0\"    # fork\n";

        assert_eq!(parse_search_output("wasmer-types", stdout), None);
    }

    #[test]
    fn test_parse_search_output_escapes_name() {
        let stdout = "a.b = \"1.0.0\"\naxb = \"2.0.0\"\n";

        assert_eq!(parse_search_output("a.b", stdout), Some("1.0.0".to_string()));
        assert_eq!(parse_search_output("a+b", stdout), None);
    }

    #[test]
    fn test_parse_search_output_empty() {
        assert_eq!(parse_search_output("anything", ""), None);
    }

    #[test]
    fn test_publish_args() {
        assert_eq!(publish_args(None, None, false), vec!["publish"]);
        assert_eq!(
            publish_args(Some("default,cranelift"), Some("internal"), true),
            vec![
                "publish",
                "--dry-run",
                "--features",
                "default,cranelift",
                "--registry",
                "internal"
            ]
        );
    }

    #[test]
    fn test_search_args() {
        assert_eq!(
            search_args("core", Some("internal")),
            vec!["search", "core", "--limit", "1", "--registry", "internal"]
        );
    }

    #[test]
    fn test_stderr_tail() {
        let stderr = b"   Updating index\n\nerror: failed to publish\n";
        assert_eq!(stderr_tail(stderr), "   Updating index\nerror: failed to publish");

        let long: String = (0..10).map(|i| format!("line {}\n", i)).collect();
        assert_eq!(stderr_tail(long.as_bytes()).lines().count(), 5);

        assert_eq!(stderr_tail(b""), "cargo exited with a non-zero status");
    }

    #[test]
    fn test_registry_name() {
        let default = CargoRegistry::new(".");
        assert_eq!(default.name(), "crates-io");

        let settings = PublishSettings {
            registry: Some("internal".to_string()),
            ..Default::default()
        };
        let custom = CargoRegistry::from_settings(".", &settings, RetryOptions::default());
        assert_eq!(custom.name(), "internal");
    }

    #[tokio::test]
    async fn test_publish_in_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let registry = CargoRegistry::new(temp_dir.path());
        let package = Package::new("ghost", "0.1.0")
            .with_manifest_path(temp_dir.path().join("missing/Cargo.toml"));

        let result = registry.publish(&package, None, true).await;

        assert!(matches!(result, Err(PublishError::CommandError(_))));
    }
}
