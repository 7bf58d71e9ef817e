//! Workspace Publisher - walks the publish order against a registry
//!
//! Packages are handled strictly one at a time. For each package the
//! registry is asked for its latest published version; a package whose
//! version is already there is skipped, anything else is published. After
//! every real publish the walk pauses so the registry index can catch up
//! before a dependent is checked.

use crate::core::config::{FailurePolicy, PublishSettings};
use crate::core::error::PublishError;
use crate::core::state_machine::{PackageState, PublishLedger};
use crate::core::traits::{Package, RegistryClient};
use crate::graph::DependencyGraph;
use crate::orchestration::publish_plan::PublishPlan;
use crate::orchestration::report::PublishRunReport;
use crate::workspace::version_validator::VersionValidator;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Options for a single publish run
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRunOptions {
    /// Validate every publish without making anything visible
    pub dry_run: bool,

    /// Pause after each real publish
    pub propagation_delay: Duration,

    pub failure_policy: FailurePolicy,

    /// Suppress progress lines on stdout
    pub quiet: bool,
}

impl Default for PublishRunOptions {
    fn default() -> Self {
        Self::from_settings(&PublishSettings::default(), false)
    }
}

impl PublishRunOptions {
    pub fn from_settings(settings: &PublishSettings, dry_run: bool) -> Self {
        Self {
            dry_run,
            propagation_delay: settings.propagation_delay(),
            failure_policy: settings.failure_policy,
            quiet: false,
        }
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }
}

/// Drives a registry client through a publish order
pub struct WorkspacePublisher<R: RegistryClient> {
    registry: R,
    options: PublishRunOptions,
}

impl<R: RegistryClient> WorkspacePublisher<R> {
    pub fn new(registry: R, options: PublishRunOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn options(&self) -> &PublishRunOptions {
        &self.options
    }

    fn progress(&self, line: &str) {
        if !self.options.quiet {
            println!("{}", line);
        }
    }

    pub async fn run_plan(&self, plan: &PublishPlan) -> PublishRunReport {
        self.run(&plan.order, &plan.packages).await
    }

    /// Walk `order`, publishing every package not yet on the registry
    ///
    /// Per-package failures are recorded in the report and never stop the
    /// walk.
    pub async fn run(
        &self,
        order: &[String],
        packages: &BTreeMap<String, Package>,
    ) -> PublishRunReport {
        let started = Instant::now();
        let mut ledger = PublishLedger::new(order.iter().map(|name| {
            let version = packages
                .get(name)
                .map(|p| p.version.as_str())
                .unwrap_or_default();
            (name.as_str(), version)
        }));
        // Failed packages whose error a re-run may clear
        let mut recoverable: Vec<String> = Vec::new();
        // Dependent -> the failed package it transitively depends on
        let mut blocked: BTreeMap<String, String> = BTreeMap::new();
        let graph = match self.options.failure_policy {
            FailurePolicy::SkipDependents => {
                let snapshot: Vec<Package> = packages.values().cloned().collect();
                Some(DependencyGraph::from_packages(&snapshot))
            }
            FailurePolicy::Attempt => None,
        };
        let mark_failed = |name: &str, blocked: &mut BTreeMap<String, String>| {
            if let Some(graph) = &graph {
                for dependent in graph.transitive_dependents(name) {
                    blocked.entry(dependent).or_insert_with(|| name.to_string());
                }
            }
        };

        self.progress(&format!(
            "\n📦 Publishing {} packages to {}{}",
            order.len(),
            self.registry.name(),
            if self.options.dry_run { " (dry run)" } else { "" }
        ));

        for (index, name) in order.iter().enumerate() {
            let Some(package) = packages.get(name) else {
                let error = PublishError::UnknownPackage {
                    package: name.clone(),
                };
                self.progress(&format!("❌ [{}] {}", error.code(), error));
                record(&mut ledger, name, PackageState::Failed, Some(error.to_string()));
                mark_failed(name, &mut blocked);
                continue;
            };

            self.progress(&format!(
                "\n[{}/{}] {} {}",
                index + 1,
                order.len(),
                package.name,
                package.version
            ));

            if let Some(dependency) = blocked.get(name) {
                let error = PublishError::DependencyFailed {
                    package: name.clone(),
                    dependency: dependency.clone(),
                };
                self.progress(&format!("❌ [{}] {}", error.code(), error));
                if error.is_recoverable() {
                    recoverable.push(name.clone());
                }
                record(&mut ledger, name, PackageState::Failed, Some(error.to_string()));
                continue;
            }

            let published_version = match self.registry.latest_published_version(name).await {
                Ok(version) => version,
                Err(e) => {
                    tracing::warn!(
                        "could not query {} for {}, assuming unpublished: {}",
                        self.registry.name(),
                        name,
                        e
                    );
                    None
                }
            };

            if let Some(published) = published_version.as_deref()
                && VersionValidator::new().is_behind_registry(&package.version, published)
            {
                tracing::warn!(
                    "{} {} is older than {} on {}",
                    name,
                    package.version,
                    published,
                    self.registry.name()
                );
            }

            if published_version.as_deref() == Some(package.version.as_str()) {
                tracing::info!("{} {} is already published", name, package.version);
                self.progress(&format!(
                    "⏭️  {} {} already published, skipping",
                    name, package.version
                ));
                record(
                    &mut ledger,
                    name,
                    PackageState::Skipped,
                    Some(format!("registry has {}", package.version)),
                );
                continue;
            }

            tracing::info!(
                "publishing {} {} (registry has {})",
                name,
                package.version,
                published_version.as_deref().unwrap_or("nothing")
            );

            match self
                .registry
                .publish(
                    package,
                    package.publish_extra_args.as_deref(),
                    self.options.dry_run,
                )
                .await
            {
                Ok(()) => {
                    self.progress(&format!("✅ {} {} published", name, package.version));
                    record(&mut ledger, name, PackageState::Published, None);

                    let is_last = index + 1 == order.len();
                    if !self.options.dry_run && !is_last && !self.options.propagation_delay.is_zero()
                    {
                        self.progress(&format!(
                            "⏳ Waiting {}s for the registry index",
                            self.options.propagation_delay.as_secs()
                        ));
                        tokio::time::sleep(self.options.propagation_delay).await;
                    }
                }
                Err(e) => {
                    tracing::debug!(code = e.code(), "publishing {} failed", name);
                    self.progress(&format!("❌ [{}] {}", e.code(), e));
                    for action in e.suggested_actions() {
                        self.progress(&format!("   - {}", action));
                    }
                    if e.is_recoverable() {
                        recoverable.push(name.clone());
                    }
                    record(&mut ledger, name, PackageState::Failed, Some(e.to_string()));
                    mark_failed(name, &mut blocked);
                }
            }
        }

        tracing::debug!("state transitions:\n{}", ledger.history());
        tracing::info!(
            "run finished: {} published, {} skipped, {} failed",
            ledger.count(PackageState::Published),
            ledger.count(PackageState::Skipped),
            ledger.count(PackageState::Failed)
        );

        let (outcomes, transitions) = ledger.into_parts();
        PublishRunReport {
            order: order.to_vec(),
            outcomes,
            dry_run: self.options.dry_run,
            recoverable,
            duration_ms: started.elapsed().as_millis() as u64,
            transitions,
        }
    }
}

fn record(ledger: &mut PublishLedger, package: &str, state: PackageState, detail: Option<String>) {
    if let Err(e) = ledger.transition(package, state, detail) {
        // Only reachable when a name appears twice in the order.
        tracing::warn!("{}", e);
    }
}
