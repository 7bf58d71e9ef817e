//! Cargo workspace reader
//!
//! Lists the publishable members of a Cargo workspace together with their
//! in-workspace dependencies, resolved to canonical package names.
//!
//! # Example
//!
//! ```no_run
//! use workspace_publisher::core::{ManifestSource, PublishConfig};
//! use workspace_publisher::workspace::CargoWorkspace;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let workspace = CargoWorkspace::new(".", &PublishConfig::default());
//! for package in workspace.list_workspace_packages().await? {
//!     println!("{} {}", package.name, package.version);
//! }
//! # Ok(())
//! # }
//! ```

use crate::core::config::{PublishConfig, WorkspaceConfig};
use crate::core::error::PublishError;
use crate::core::traits::{ManifestSource, Package};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use toml::{Table, Value};
use walkdir::WalkDir;

const MANIFEST_FILE: &str = "Cargo.toml";

/// Manifest source backed by the `Cargo.toml` files of a workspace
#[derive(Debug, Clone)]
pub struct CargoWorkspace {
    root: PathBuf,
    settings: WorkspaceConfig,
    features: BTreeMap<String, String>,
    version_override: Option<String>,
}

impl CargoWorkspace {
    pub fn new<P: Into<PathBuf>>(root: P, config: &PublishConfig) -> Self {
        Self {
            root: root.into(),
            settings: config.workspace.clone(),
            features: config.publish.features.clone(),
            version_override: None,
        }
    }

    /// Replace the version of every member that inherits the workspace
    /// version
    pub fn with_version_override(mut self, version: Option<String>) -> Self {
        self.version_override = version;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Workspace version (`[workspace.package] version`), or the override
    pub async fn workspace_version(&self) -> Result<Option<String>, PublishError> {
        if let Some(version) = &self.version_override {
            return Ok(Some(version.clone()));
        }

        let root = read_manifest(&self.root.join(MANIFEST_FILE)).await?;
        Ok(root
            .get("workspace")
            .and_then(|w| w.get("package"))
            .and_then(|p| p.get("version"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Relative paths of the members that take part in publishing
    fn member_paths(&self, root: &Table) -> Vec<String> {
        let workspace = root.get("workspace").and_then(Value::as_table);

        let excluded: BTreeSet<String> = workspace
            .and_then(|w| w.get("exclude"))
            .map(string_array)
            .unwrap_or_default()
            .into_iter()
            .map(|p| normalize(&p))
            .collect();

        let mut members = BTreeSet::new();
        for entry in workspace
            .and_then(|w| w.get("members"))
            .map(string_array)
            .unwrap_or_default()
        {
            let entry = normalize(&entry);
            match entry.strip_suffix("/*") {
                Some(parent) => members.extend(self.expand_glob(parent)),
                None => {
                    members.insert(entry);
                }
            }
        }

        // Path dependencies of the root package and of the workspace table
        // are published too, even when they are not listed as members.
        let root_deps = root.get("dependencies").and_then(Value::as_table);
        let workspace_deps = workspace
            .and_then(|w| w.get("dependencies"))
            .and_then(Value::as_table);
        for table in [root_deps, workspace_deps].into_iter().flatten() {
            for spec in table.values() {
                if let Some(path) = spec.get("path").and_then(Value::as_str) {
                    members.insert(normalize(path));
                }
            }
        }

        members.retain(|m| !excluded.contains(m) && m != ".");
        if !self.settings.member_prefixes.is_empty() {
            members.retain(|m| {
                self.settings
                    .member_prefixes
                    .iter()
                    .any(|prefix| m.starts_with(prefix.as_str()))
            });
        }

        for extra in &self.settings.extra_members {
            let extra = normalize(extra);
            if self.root.join(&extra).join(MANIFEST_FILE).is_file() {
                members.insert(extra);
            } else {
                tracing::debug!("extra member {} has no manifest, ignoring", extra);
            }
        }

        members.into_iter().collect()
    }

    /// Expand `parent/*` to every direct subdirectory holding a manifest
    fn expand_glob(&self, parent: &str) -> Vec<String> {
        WalkDir::new(self.root.join(parent))
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .filter(|entry| entry.path().join(MANIFEST_FILE).is_file())
            .map(|entry| format!("{}/{}", parent, entry.file_name().to_string_lossy()))
            .collect()
    }

    /// Read one member manifest; `None` for members cargo will not publish
    async fn read_member(
        &self,
        member: &str,
        workspace: Option<&Table>,
    ) -> Result<Option<(Package, BTreeSet<String>)>, PublishError> {
        let manifest_path = self.root.join(member).join(MANIFEST_FILE);
        let manifest = read_manifest(&manifest_path).await?;

        let manifest_error = |message: &str| PublishError::ManifestError {
            path: manifest_path.clone(),
            message: message.to_string(),
        };

        let package = manifest
            .get("package")
            .and_then(Value::as_table)
            .ok_or_else(|| manifest_error("missing [package] table"))?;

        let name = package
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| manifest_error("missing package.name"))?;

        let workspace_package = workspace
            .and_then(|w| w.get("package"))
            .and_then(Value::as_table);

        if is_unpublishable(package, workspace_package) {
            tracing::debug!("skipping {} (publish = false)", name);
            return Ok(None);
        }

        let version = match package.get("version") {
            Some(Value::String(version)) => version.clone(),
            Some(Value::Table(t)) if inherits(t) => self
                .version_override
                .clone()
                .or_else(|| {
                    workspace_package
                        .and_then(|p| p.get("version"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .ok_or_else(|| {
                    manifest_error("version.workspace = true but no [workspace.package] version")
                })?,
            Some(_) => return Err(manifest_error("package.version must be a string")),
            // Without a version cargo treats the package as `publish = false`
            None => {
                tracing::debug!("skipping {} (no package.version)", name);
                return Ok(None);
            }
        };

        let workspace_deps = workspace
            .and_then(|w| w.get("dependencies"))
            .and_then(Value::as_table);
        let dependencies = local_dependencies(
            &manifest,
            workspace_deps,
            self.settings.include_dev_dependencies,
        );

        let mut package = Package::new(name, version).with_manifest_path(manifest_path);
        if let Some(features) = self.features.get(name) {
            package = package.with_extra_args(features.clone());
        }

        Ok(Some((package, dependencies)))
    }
}

#[async_trait]
impl ManifestSource for CargoWorkspace {
    async fn list_workspace_packages(&self) -> Result<Vec<Package>, PublishError> {
        let root = read_manifest(&self.root.join(MANIFEST_FILE)).await?;
        let workspace = root.get("workspace").and_then(Value::as_table);

        let mut collected = Vec::new();
        for member in self.member_paths(&root) {
            if let Some(entry) = self.read_member(&member, workspace).await? {
                tracing::debug!("found {} {} at {}", entry.0.name, entry.0.version, member);
                collected.push(entry);
            }
        }

        let known: BTreeSet<String> = collected.iter().map(|(p, _)| p.name.clone()).collect();

        let packages = collected
            .into_iter()
            .map(|(package, dependencies)| {
                let (local, outside): (BTreeSet<String>, BTreeSet<String>) = dependencies
                    .into_iter()
                    .filter(|dep| *dep != package.name)
                    .partition(|dep| known.contains(dep));

                for dep in &outside {
                    tracing::debug!(
                        "{}: dropping path dependency {} outside the publish set",
                        package.name,
                        dep
                    );
                }

                package.with_dependencies(local)
            })
            .collect();

        Ok(packages)
    }
}

async fn read_manifest(path: &Path) -> Result<Table, PublishError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| PublishError::ManifestError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    toml::from_str(&content).map_err(|e| PublishError::ManifestError {
        path: path.to_path_buf(),
        message: format!("Invalid TOML: {}", e),
    })
}

/// Canonical names of every local dependency declared by a manifest
///
/// Walks `[dependencies]`, `[build-dependencies]`, optionally
/// `[dev-dependencies]`, and the same tables under every `[target.*]`.
fn local_dependencies(
    manifest: &Table,
    workspace_deps: Option<&Table>,
    include_dev: bool,
) -> BTreeSet<String> {
    let mut sections = vec!["dependencies", "build-dependencies"];
    if include_dev {
        sections.push("dev-dependencies");
    }

    let targets = manifest
        .get("target")
        .and_then(Value::as_table)
        .into_iter()
        .flat_map(|targets| targets.values())
        .filter_map(Value::as_table);

    let mut names = BTreeSet::new();
    for scope in std::iter::once(manifest).chain(targets) {
        for section in &sections {
            let Some(table) = scope.get(*section).and_then(Value::as_table) else {
                continue;
            };
            for (key, spec) in table {
                if let Some(name) = local_dependency_name(key, spec, workspace_deps) {
                    names.insert(name);
                }
            }
        }
    }

    names
}

/// `Some(package name)` when `spec` points at a path inside the workspace
fn local_dependency_name(key: &str, spec: &Value, workspace_deps: Option<&Table>) -> Option<String> {
    let spec = spec.as_table()?;
    let renamed = spec.get("package").and_then(Value::as_str);

    if spec.contains_key("path") {
        return Some(renamed.unwrap_or(key).to_string());
    }

    if inherits(spec) {
        let inherited = workspace_deps?.get(key)?.as_table()?;
        if inherited.contains_key("path") {
            let inherited_rename = inherited.get("package").and_then(Value::as_str);
            return Some(renamed.or(inherited_rename).unwrap_or(key).to_string());
        }
    }

    None
}

fn inherits(table: &Table) -> bool {
    table.get("workspace").and_then(Value::as_bool) == Some(true)
}

/// `publish = false`, `publish = []`, or either inherited through
/// `publish.workspace = true`
fn is_unpublishable(package: &Table, workspace_package: Option<&Table>) -> bool {
    let publish = match package.get("publish") {
        Some(Value::Table(t)) if inherits(t) => {
            workspace_package.and_then(|p| p.get("publish"))
        }
        other => other,
    };

    match publish {
        Some(Value::Boolean(publish)) => !publish,
        Some(Value::Array(registries)) => registries.is_empty(),
        _ => false,
    }
}

fn string_array(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    if trimmed.is_empty() {
        ".".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn member(name: &str, extra: &str) -> String {
        format!(
            "[package]\nname = \"{}\"\nversion.workspace = true\n\n{}",
            name, extra
        )
    }

    fn fixture() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        write(
            root,
            "Cargo.toml",
            r#"
[package]
name = "umbrella"
version = "0.0.0"

[workspace]
members = ["lib/*", "tests/integration"]
exclude = ["lib/experimental"]

[workspace.package]
version = "4.2.0"

[workspace.dependencies]
shared-types = { path = "lib/types", package = "acme-types", version = "=4.2.0" }
serde = "1"

[dependencies]
acme-cli = { path = "lib/cli" }
"#,
        );
        write(root, "lib/types/Cargo.toml", &member("acme-types", ""));
        write(
            root,
            "lib/vm/Cargo.toml",
            &member(
                "acme-vm",
                r#"
[dependencies]
shared-types = { workspace = true }
serde = { workspace = true }

[target.'cfg(unix)'.dependencies]
libc = "0.2"
"#,
            ),
        );
        write(
            root,
            "lib/compiler/Cargo.toml",
            &member(
                "acme-compiler",
                r#"
[target.'cfg(not(target_arch = "wasm32"))'.dependencies]
vm = { path = "../vm", package = "acme-vm" }

[build-dependencies]
acme-types = { path = "../types" }
"#,
            ),
        );
        write(
            root,
            "lib/cli/Cargo.toml",
            &member(
                "acme-cli",
                r#"
[dependencies]
acme-compiler = { path = "../compiler" }
outside = { path = "../../vendor/outside" }

[dev-dependencies]
acme-testkit = { path = "../testkit" }
"#,
            ),
        );
        write(
            root,
            "lib/testkit/Cargo.toml",
            "[package]\nname = \"acme-testkit\"\nversion = \"0.1.0\"\npublish = false\n",
        );
        write(root, "lib/experimental/Cargo.toml", &member("acme-experimental", ""));
        write(root, "lib/not-a-crate/README.md", "nothing here");
        write(
            root,
            "tests/integration/Cargo.toml",
            &member("acme-integration", "[dependencies]\nacme-cli = { path = \"../../lib/cli\" }\n"),
        );

        temp_dir
    }

    fn by_name(packages: Vec<Package>) -> BTreeMap<String, Package> {
        packages.into_iter().map(|p| (p.name.clone(), p)).collect()
    }

    #[tokio::test]
    async fn test_lists_members_with_local_dependencies() {
        let temp_dir = fixture();
        let workspace = CargoWorkspace::new(temp_dir.path(), &PublishConfig::default());

        let packages = by_name(workspace.list_workspace_packages().await.unwrap());

        assert_eq!(
            packages.keys().cloned().collect::<Vec<_>>(),
            vec![
                "acme-cli",
                "acme-compiler",
                "acme-integration",
                "acme-types",
                "acme-vm"
            ]
        );
        assert!(packages["acme-types"].dependencies.is_empty());
        assert_eq!(
            packages["acme-compiler"].dependencies,
            BTreeSet::from(["acme-types".to_string(), "acme-vm".to_string()])
        );
        assert_eq!(packages["acme-cli"].version, "4.2.0");
    }

    #[tokio::test]
    async fn test_workspace_dependency_resolves_through_rename() {
        let temp_dir = fixture();
        let workspace = CargoWorkspace::new(temp_dir.path(), &PublishConfig::default());

        let packages = by_name(workspace.list_workspace_packages().await.unwrap());

        assert_eq!(
            packages["acme-vm"].dependencies,
            BTreeSet::from(["acme-types".to_string()])
        );
    }

    #[tokio::test]
    async fn test_drops_dependencies_outside_publish_set() {
        let temp_dir = fixture();
        let workspace = CargoWorkspace::new(temp_dir.path(), &PublishConfig::default());

        let packages = by_name(workspace.list_workspace_packages().await.unwrap());

        // `outside` is not a member and `acme-testkit` has publish = false
        assert_eq!(
            packages["acme-cli"].dependencies,
            BTreeSet::from(["acme-compiler".to_string()])
        );
    }

    #[tokio::test]
    async fn test_member_prefixes_and_extra_members() {
        let temp_dir = fixture();
        let mut config = PublishConfig::default();
        config.workspace.member_prefixes = vec!["lib/".to_string()];
        config.workspace.extra_members = vec!["tests/integration".to_string(), "missing".to_string()];
        config
            .publish
            .features
            .insert("acme-cli".to_string(), "default,llvm".to_string());

        let workspace = CargoWorkspace::new(temp_dir.path(), &config);
        let packages = by_name(workspace.list_workspace_packages().await.unwrap());

        assert!(packages.contains_key("acme-integration"));
        assert_eq!(
            packages["acme-cli"].publish_extra_args.as_deref(),
            Some("default,llvm")
        );
        assert_eq!(packages["acme-vm"].publish_extra_args, None);

        config.workspace.extra_members.clear();
        let workspace = CargoWorkspace::new(temp_dir.path(), &config);
        let packages = by_name(workspace.list_workspace_packages().await.unwrap());
        assert!(!packages.contains_key("acme-integration"));
    }

    #[tokio::test]
    async fn test_dev_dependencies_can_be_ignored() {
        let temp_dir = fixture();
        write(
            temp_dir.path(),
            "lib/types/Cargo.toml",
            &member(
                "acme-types",
                "[dev-dependencies]\nacme-vm = { path = \"../vm\" }\n",
            ),
        );

        let workspace = CargoWorkspace::new(temp_dir.path(), &PublishConfig::default());
        let packages = by_name(workspace.list_workspace_packages().await.unwrap());
        assert!(packages["acme-types"].dependencies.contains("acme-vm"));

        let mut config = PublishConfig::default();
        config.workspace.include_dev_dependencies = false;
        let workspace = CargoWorkspace::new(temp_dir.path(), &config);
        let packages = by_name(workspace.list_workspace_packages().await.unwrap());
        assert!(packages["acme-types"].dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_version_override() {
        let temp_dir = fixture();
        write(
            temp_dir.path(),
            "lib/types/Cargo.toml",
            "[package]\nname = \"acme-types\"\nversion = \"0.9.0\"\n",
        );

        let workspace = CargoWorkspace::new(temp_dir.path(), &PublishConfig::default())
            .with_version_override(Some("5.0.0".to_string()));
        let packages = by_name(workspace.list_workspace_packages().await.unwrap());

        assert_eq!(packages["acme-vm"].version, "5.0.0");
        assert_eq!(packages["acme-types"].version, "0.9.0");
        assert_eq!(
            workspace.workspace_version().await.unwrap().as_deref(),
            Some("5.0.0")
        );
    }

    #[tokio::test]
    async fn test_workspace_version() {
        let temp_dir = fixture();
        let workspace = CargoWorkspace::new(temp_dir.path(), &PublishConfig::default());

        assert_eq!(
            workspace.workspace_version().await.unwrap().as_deref(),
            Some("4.2.0")
        );
    }

    #[tokio::test]
    async fn test_missing_root_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = CargoWorkspace::new(temp_dir.path(), &PublishConfig::default());

        let result = workspace.list_workspace_packages().await;

        assert!(matches!(result, Err(PublishError::ManifestError { .. })));
    }

    #[tokio::test]
    async fn test_unresolved_inherited_version_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "Cargo.toml",
            "[workspace]\nmembers = [\"broken\"]\n",
        );
        write(
            temp_dir.path(),
            "broken/Cargo.toml",
            "[package]\nname = \"broken\"\nversion.workspace = true\n",
        );

        let workspace = CargoWorkspace::new(temp_dir.path(), &PublishConfig::default());
        let error = workspace.list_workspace_packages().await.unwrap_err();

        match error {
            PublishError::ManifestError { path, message } => {
                assert!(path.ends_with("broken/Cargo.toml"));
                assert!(message.contains("workspace.package"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_member_without_version_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "Cargo.toml", "[workspace]\nmembers = [\"lib/*\"]\n");
        write(
            temp_dir.path(),
            "lib/core/Cargo.toml",
            "[package]\nname = \"core\"\nversion = \"1.0.0\"\n",
        );
        write(
            temp_dir.path(),
            "lib/bench/Cargo.toml",
            "[package]\nname = \"bench\"\n\n[dependencies]\ncore = { path = \"../core\" }\n",
        );

        let workspace = CargoWorkspace::new(temp_dir.path(), &PublishConfig::default());
        let packages = workspace.list_workspace_packages().await.unwrap();

        let names: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["core"]);
    }

    #[tokio::test]
    async fn test_inherited_publish_false_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "Cargo.toml",
            "[workspace]\nmembers = [\"core\"]\n\n[workspace.package]\nversion = \"1.0.0\"\npublish = false\n",
        );
        write(
            temp_dir.path(),
            "core/Cargo.toml",
            "[package]\nname = \"core\"\nversion.workspace = true\npublish.workspace = true\n",
        );

        let workspace = CargoWorkspace::new(temp_dir.path(), &PublishConfig::default());
        let packages = workspace.list_workspace_packages().await.unwrap();

        assert!(packages.is_empty());
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("./lib/api/"), "lib/api");
        assert_eq!(normalize("lib/*"), "lib/*");
        assert_eq!(normalize("./"), ".");
    }

    #[test]
    fn test_is_unpublishable() {
        let table = |s: &str| -> Table { toml::from_str(s).unwrap() };

        assert!(is_unpublishable(&table("publish = false"), None));
        assert!(is_unpublishable(&table("publish = []"), None));
        assert!(!is_unpublishable(&table("publish = [\"internal\"]"), None));
        assert!(!is_unpublishable(&table("name = \"x\""), None));

        let inherited = table("publish.workspace = true");
        assert!(is_unpublishable(&inherited, Some(&table("publish = false"))));
        assert!(!is_unpublishable(&inherited, Some(&table("publish = true"))));
        assert!(!is_unpublishable(&inherited, None));
    }
}
