//! Publish run report

use crate::core::state_machine::{PackageOutcome, PackageState, StateTransition};
use serde::Serialize;
use std::collections::BTreeMap;

/// Final state of every package after one run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRunReport {
    pub order: Vec<String>,
    pub outcomes: BTreeMap<String, PackageOutcome>,
    pub dry_run: bool,
    /// Failed packages whose error a re-run may clear, in publish order
    pub recoverable: Vec<String>,
    pub duration_ms: u64,
    pub transitions: Vec<StateTransition>,
}

impl PublishRunReport {
    fn names_in(&self, state: PackageState) -> Vec<&str> {
        // Report in publish order; packages outside the order go last.
        let mut names: Vec<&str> = self
            .order
            .iter()
            .filter(|name| self.state(name) == Some(state))
            .map(String::as_str)
            .collect();
        names.extend(
            self.outcomes
                .iter()
                .filter(|(name, o)| o.state == state && !self.order.contains(name))
                .map(|(name, _)| name.as_str()),
        );
        names
    }

    pub fn state(&self, package: &str) -> Option<PackageState> {
        self.outcomes.get(package).map(|o| o.state)
    }

    pub fn published(&self) -> Vec<&str> {
        self.names_in(PackageState::Published)
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.names_in(PackageState::Skipped)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.names_in(PackageState::Failed)
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| o.state == PackageState::Failed)
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }

    /// Process exit code: 0 only when no package failed
    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Print the end-of-run summary
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(60));
        if self.dry_run {
            println!("📊 Publish Summary (dry run)");
        } else {
            println!("📊 Publish Summary");
        }
        println!("{}", "=".repeat(60));

        for name in &self.order {
            let Some(outcome) = self.outcomes.get(name) else {
                continue;
            };
            let marker = match outcome.state {
                PackageState::Published => "✅",
                PackageState::Skipped => "⏭️ ",
                PackageState::Failed => "❌",
                PackageState::Pending => "⏸️ ",
            };
            match &outcome.detail {
                Some(detail) if outcome.state == PackageState::Failed => {
                    let first_line = detail.lines().next().unwrap_or_default();
                    println!(
                        "{} {} {} ({}): {}",
                        marker, name, outcome.version, outcome.state, first_line
                    );
                }
                _ => println!("{} {} {} ({})", marker, name, outcome.version, outcome.state),
            }
        }

        println!(
            "\nPublished: {}  Skipped: {}  Failed: {}  ({}ms)",
            self.published().len(),
            self.skipped().len(),
            self.failure_count(),
            self.duration_ms
        );
        println!(
            "Overall Status: {}",
            if self.is_success() {
                "✅ SUCCESS"
            } else {
                "❌ FAILED"
            }
        );
        if !self.recoverable.is_empty() {
            println!(
                "Re-run to retry: {} (published packages are skipped)",
                self.recoverable.join(", ")
            );
        }
        println!("{}\n", "=".repeat(60));
    }
}
