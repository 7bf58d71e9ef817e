//! Per-package state tracking for a publish run
//!
//! Every package starts `Pending` and moves exactly once into one of the
//! terminal states. The ledger lives only for the duration of a run.

use crate::core::error::PublishError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Publishing state of a single package
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackageState {
    Pending,
    Skipped,
    Published,
    Failed,
}

impl PackageState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PackageState::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PackageState::Pending => "PENDING",
            PackageState::Skipped => "SKIPPED",
            PackageState::Published => "PUBLISHED",
            PackageState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    pub package: String,
    pub from: PackageState,
    pub to: PackageState,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Final (or current) outcome of a package
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackageOutcome {
    pub state: PackageState,
    /// Version the run targeted
    pub version: String,
    /// Error message for failures, registry version for skips
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Ledger of package states for one publish run
#[derive(Debug, Default)]
pub struct PublishLedger {
    outcomes: BTreeMap<String, PackageOutcome>,
    transitions: Vec<StateTransition>,
}

impl PublishLedger {
    /// Create a ledger with every package `Pending`
    pub fn new<'a, I>(packages: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let outcomes = packages
            .into_iter()
            .map(|(name, version)| {
                (
                    name.to_string(),
                    PackageOutcome {
                        state: PackageState::Pending,
                        version: version.to_string(),
                        detail: None,
                    },
                )
            })
            .collect();

        Self {
            outcomes,
            transitions: Vec::new(),
        }
    }

    /// Move a package into a terminal state
    ///
    /// Unknown packages are registered on the fly with an empty version so
    /// that the report still lists them.
    pub fn transition(
        &mut self,
        package: &str,
        to: PackageState,
        detail: Option<String>,
    ) -> Result<(), PublishError> {
        let outcome = self
            .outcomes
            .entry(package.to_string())
            .or_insert_with(|| PackageOutcome {
                state: PackageState::Pending,
                version: String::new(),
                detail: None,
            });

        if outcome.state.is_terminal() || !to.is_terminal() {
            return Err(PublishError::InvalidTransition {
                package: package.to_string(),
                from: outcome.state.to_string(),
                to: to.to_string(),
            });
        }

        self.transitions.push(StateTransition {
            package: package.to_string(),
            from: outcome.state,
            to,
            timestamp: Utc::now(),
            detail: detail.clone(),
        });
        outcome.state = to;
        outcome.detail = detail;

        Ok(())
    }

    pub fn state(&self, package: &str) -> Option<PackageState> {
        self.outcomes.get(package).map(|o| o.state)
    }

    pub fn count(&self, state: PackageState) -> usize {
        self.outcomes.values().filter(|o| o.state == state).count()
    }

    pub fn outcomes(&self) -> &BTreeMap<String, PackageOutcome> {
        &self.outcomes
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// Consume the ledger, returning outcomes and transition history
    pub fn into_parts(self) -> (BTreeMap<String, PackageOutcome>, Vec<StateTransition>) {
        (self.outcomes, self.transitions)
    }

    /// Get transition history as human-readable string
    pub fn history(&self) -> String {
        self.transitions
            .iter()
            .map(|t| {
                let detail = t
                    .detail
                    .as_ref()
                    .map(|d| format!(" ({})", d))
                    .unwrap_or_default();
                format!(
                    "{}: {} {:?} → {:?}{}",
                    t.timestamp.to_rfc3339(),
                    t.package,
                    t.from,
                    t.to,
                    detail
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> PublishLedger {
        PublishLedger::new([("a", "1.0.0"), ("b", "1.0.0")])
    }

    #[test]
    fn test_new_ledger_is_pending() {
        let ledger = ledger();

        assert_eq!(ledger.state("a"), Some(PackageState::Pending));
        assert_eq!(ledger.state("b"), Some(PackageState::Pending));
        assert_eq!(ledger.count(PackageState::Pending), 2);
        assert!(ledger.transitions().is_empty());
    }

    #[test]
    fn test_transition_to_terminal() {
        let mut ledger = ledger();

        ledger
            .transition("a", PackageState::Published, None)
            .unwrap();
        ledger
            .transition("b", PackageState::Failed, Some("rejected".to_string()))
            .unwrap();

        assert_eq!(ledger.state("a"), Some(PackageState::Published));
        assert_eq!(ledger.outcomes()["b"].detail.as_deref(), Some("rejected"));
        assert_eq!(ledger.count(PackageState::Failed), 1);
        assert_eq!(ledger.transitions().len(), 2);
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut ledger = ledger();
        ledger.transition("a", PackageState::Skipped, None).unwrap();

        let result = ledger.transition("a", PackageState::Published, None);

        assert!(matches!(
            result,
            Err(PublishError::InvalidTransition { .. })
        ));
        assert_eq!(ledger.state("a"), Some(PackageState::Skipped));
    }

    #[test]
    fn test_cannot_transition_back_to_pending() {
        let mut ledger = ledger();

        let result = ledger.transition("a", PackageState::Pending, None);

        assert!(result.is_err());
        assert!(ledger.transitions().is_empty());
    }

    #[test]
    fn test_unknown_package_is_registered() {
        let mut ledger = ledger();

        ledger
            .transition("ghost", PackageState::Failed, Some("unknown".to_string()))
            .unwrap();

        assert_eq!(ledger.state("ghost"), Some(PackageState::Failed));
        assert_eq!(ledger.outcomes()["ghost"].version, "");
    }

    #[test]
    fn test_history() {
        let mut ledger = ledger();
        ledger.transition("a", PackageState::Published, None).unwrap();
        ledger
            .transition("b", PackageState::Skipped, Some("1.0.0".to_string()))
            .unwrap();

        let history = ledger.history();
        assert!(history.contains("a Pending → Published"));
        assert!(history.contains("b Pending → Skipped (1.0.0)"));
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&PackageState::Published).unwrap();
        assert_eq!(json, r#""PUBLISHED""#);
    }
}
