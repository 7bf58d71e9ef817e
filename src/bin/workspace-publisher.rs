//! Workspace Publisher CLI
//!
//! Publishes every package of a Cargo workspace in dependency order

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;
use workspace_publisher::{
    CargoRegistry, CargoWorkspace, ConfigLoadOptions, ConfigLoader, FailurePolicy, PublishConfig,
    PublishError, PublishPlan, PublishRunOptions, RetryOptions, VersionValidator,
    WorkspacePublisher,
};

/// Publish a Cargo workspace in dependency order
#[derive(Parser)]
#[command(name = "workspace-publisher")]
#[command(version)]
#[command(about = "Publish a Cargo workspace in dependency order", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the workspace can be ordered for publishing
    HealthCheck {
        /// Workspace root (defaults to current directory)
        #[arg(value_name = "WORKSPACE_PATH")]
        workspace_path: Option<PathBuf>,

        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,

        /// Print each package's local dependencies
        #[arg(long)]
        print_dependencies: bool,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Publish every workspace package not yet on the registry
    Publish {
        /// Workspace root (defaults to current directory)
        #[arg(value_name = "WORKSPACE_PATH")]
        workspace_path: Option<PathBuf>,

        /// Version for packages that inherit the workspace version
        #[arg(long)]
        version: Option<String>,

        /// Run `cargo publish --dry-run` for every package
        #[arg(long)]
        dry_run: bool,

        /// Verbose logging
        #[arg(short, long)]
        verbose: bool,

        /// Mark dependents of a failed package as failed without publishing
        #[arg(long)]
        strict: bool,

        /// Seconds to wait after each publish
        #[arg(long, value_name = "SECONDS")]
        delay_secs: Option<u64>,

        /// Alternative registry name
        #[arg(long)]
        registry: Option<String>,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let result = run().await;

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            match e.downcast_ref::<PublishError>() {
                Some(error) => eprintln!("\n❌ Error [{}]", error.code()),
                None => eprintln!("\n❌ Error"),
            }
            eprintln!("{:#}", e);
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::HealthCheck {
            workspace_path,
            verbose,
            print_dependencies,
            json,
        } => {
            init_tracing(verbose);
            let path = workspace_path.unwrap_or_else(|| PathBuf::from("."));
            health_check_command(path, print_dependencies, json).await
        }
        Commands::Publish {
            workspace_path,
            version,
            dry_run,
            verbose,
            strict,
            delay_secs,
            registry,
            json,
        } => {
            init_tracing(verbose);
            let path = workspace_path.unwrap_or_else(|| PathBuf::from("."));
            let overrides = CliOverrides {
                strict,
                delay_secs,
                registry,
            };
            publish_command(path, version, dry_run, overrides, json).await
        }
    }
}

/// Flags that take priority over the config file and environment
struct CliOverrides {
    strict: bool,
    delay_secs: Option<u64>,
    registry: Option<String>,
}

impl CliOverrides {
    fn apply(self, config: &mut PublishConfig) {
        if self.strict {
            config.publish.failure_policy = FailurePolicy::SkipDependents;
        }
        if let Some(delay) = self.delay_secs {
            config.publish.propagation_delay_secs = delay;
        }
        if let Some(registry) = self.registry {
            config.publish.registry = Some(registry);
        }
    }
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `-v`
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_config(workspace_path: &Path) -> Result<Option<PublishConfig>> {
    let config = ConfigLoader::load(ConfigLoadOptions::for_project(workspace_path))
        .await
        .context("Failed to load configuration")?;

    let validation = ConfigLoader::validate(&config);
    if !validation.valid {
        eprintln!("{}", ConfigLoader::format_validation_result(&validation));
        return Ok(None);
    }
    for warning in &validation.warnings {
        tracing::warn!("[{}] {}", warning.field, warning.message);
    }

    Ok(Some(config))
}

/// Build the plan, reporting a cycle on stderr instead of failing the command
async fn plan_workspace(workspace: &CargoWorkspace) -> Result<Option<PublishPlan>> {
    match PublishPlan::from_source(workspace).await {
        Ok(plan) => Ok(Some(plan)),
        Err(PublishError::CycleDetected(cycle)) => {
            eprintln!("\n❌ {}", cycle);
            if cycle.unresolved.len() > cycle.cyclic.len() {
                let blocked: Vec<&str> = cycle
                    .unresolved
                    .difference(&cycle.cyclic)
                    .map(String::as_str)
                    .collect();
                eprintln!("   blocked behind the cycle: {}", blocked.join(", "));
            }
            Ok(None)
        }
        Err(e) => Err(e).context("Failed to read workspace manifests"),
    }
}

async fn health_check_command(
    workspace_path: PathBuf,
    print_dependencies: bool,
    json: bool,
) -> Result<i32> {
    if !json {
        println!("\n🔍 Workspace Health Check\n");
    }

    let Some(config) = load_config(&workspace_path).await? else {
        return Ok(1);
    };

    let workspace = CargoWorkspace::new(&workspace_path, &config);
    let workspace_version = workspace.workspace_version().await?;

    let Some(plan) = plan_workspace(&workspace).await? else {
        return Ok(1);
    };

    // With --json stdout carries the plan document and nothing else.
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(0);
    }

    println!(
        "Workspace version: {}",
        workspace_version.as_deref().unwrap_or("(not set)")
    );
    plan.print(print_dependencies);
    println!("\n✅ {} packages can be published in order", plan.len());
    Ok(0)
}

async fn publish_command(
    workspace_path: PathBuf,
    version: Option<String>,
    dry_run: bool,
    overrides: CliOverrides,
    json: bool,
) -> Result<i32> {
    if !json {
        println!("\n📦 workspace-publisher\n");
    }

    let validator = VersionValidator::new();
    let version = version
        .map(|v| validator.validate_override(&v))
        .transpose()?
        .map(|v| v.to_string());
    if let Some(version) = &version
        && validator.is_prerelease(version)
    {
        tracing::warn!("{} is a pre-release; cargo will not make it the default version", version);
    }

    let Some(mut config) = load_config(&workspace_path).await? else {
        return Ok(1);
    };
    overrides.apply(&mut config);

    let workspace =
        CargoWorkspace::new(&workspace_path, &config).with_version_override(version.clone());
    if let Some(version) = &version
        && !json
    {
        println!("Version override: {}", version);
    }

    let Some(plan) = plan_workspace(&workspace).await? else {
        return Ok(1);
    };

    let registry = CargoRegistry::from_settings(
        &workspace_path,
        &config.publish,
        RetryOptions::from(&config.retry),
    );
    let publisher = WorkspacePublisher::new(
        registry,
        PublishRunOptions::from_settings(&config.publish, dry_run).with_quiet(json),
    );

    let report = publisher.run_plan(&plan).await;

    if json {
        println!("{}", report.to_json()?);
    } else {
        report.print_summary();
    }

    Ok(report.exit_code())
}
