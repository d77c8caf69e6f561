//! Core types for the reconciler.

use std::fmt;

use chrono::{DateTime, Utc};
use fleet_core::ResourceKind;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// What the reconciler decided to do with one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    /// Place a never-assigned connector on its namespace's cluster.
    AssignNew,
    /// Ask the agent to bring actual state in line with desired state.
    RequestUpdate,
    /// Ask the agent to remove the resource, or remove it directly.
    RequestDelete,
    /// Nothing to do.
    NoOp,
    /// Stop waiting on the agent and mark the resource failed.
    EscalateFailed,
}

impl ReconcileAction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AssignNew => "assign_new",
            Self::RequestUpdate => "request_update",
            Self::RequestDelete => "request_delete",
            Self::NoOp => "no_op",
            Self::EscalateFailed => "escalate_failed",
        }
    }

    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }
}

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A planned action bound to the row version it was planned against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub kind: ResourceKind,
    pub id: String,
    pub action: ReconcileAction,
    pub expected_version: u64,
}

/// How applying one planned action ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The claim committed at `resource_version`.
    Applied { resource_version: u64 },
    /// Another writer moved the row first; nothing was written.
    LostRace,
    /// Preconditions not met yet; retried on a later sweep.
    Deferred { reason: String },
    /// Nothing was planned.
    Skipped,
    Failed { reason: String },
}

impl ReconcileOutcome {
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Applied { .. } => "applied",
            Self::LostRace => "lost_race",
            Self::Deferred { .. } => "deferred",
            Self::Skipped => "skipped",
            Self::Failed { .. } => "failed",
        }
    }
}

/// One planned action and what became of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    #[serde(flatten)]
    pub planned: PlannedAction,
    #[serde(flatten)]
    pub outcome: ReconcileOutcome,
}

/// Summary of one sweep over a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub taken_at: DateTime<Utc>,
    /// Live resources examined.
    pub examined: usize,
    /// Resources already in their desired state.
    pub converged: usize,
    /// Non-`NoOp` actions.
    pub planned: usize,
    pub applied: usize,
    pub lost_races: usize,
    pub deferred: usize,
    pub failed: usize,
    pub actions: Vec<ActionRecord>,
}

impl SweepReport {
    pub fn new(
        taken_at: DateTime<Utc>,
        examined: usize,
        converged: usize,
        actions: Vec<ActionRecord>,
    ) -> Self {
        let counts = actions.iter().counts_by(|record| record.outcome.label());
        let count = |label: &str| counts.get(label).copied().unwrap_or_default();
        Self {
            taken_at,
            examined,
            converged,
            planned: actions.len(),
            applied: count("applied"),
            lost_races: count("lost_race"),
            deferred: count("deferred"),
            failed: count("failed"),
            actions,
        }
    }

    /// Nothing was left to do.
    pub const fn is_settled(&self) -> bool {
        self.planned == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(action: ReconcileAction, outcome: ReconcileOutcome) -> ActionRecord {
        ActionRecord {
            planned: PlannedAction {
                kind: ResourceKind::Connector,
                id: "c1".to_string(),
                action,
                expected_version: 3,
            },
            outcome,
        }
    }

    #[test]
    fn test_sweep_report_counts_outcomes() {
        let report = SweepReport::new(
            Utc::now(),
            5,
            2,
            vec![
                record(
                    ReconcileAction::RequestUpdate,
                    ReconcileOutcome::Applied { resource_version: 4 },
                ),
                record(ReconcileAction::RequestDelete, ReconcileOutcome::LostRace),
                record(
                    ReconcileAction::AssignNew,
                    ReconcileOutcome::Deferred {
                        reason: "cluster not ready".to_string(),
                    },
                ),
            ],
        );

        assert_eq!(report.planned, 3);
        assert_eq!(report.applied, 1);
        assert_eq!(report.lost_races, 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(report.failed, 0);
        assert!(!report.is_settled());
    }

    #[test]
    fn test_action_record_serializes_flat() {
        let json = serde_json::to_value(record(
            ReconcileAction::EscalateFailed,
            ReconcileOutcome::Applied { resource_version: 4 },
        ))
        .unwrap_or_default();

        assert_eq!(json["action"], "escalate_failed");
        assert_eq!(json["outcome"], "applied");
        assert_eq!(json["resource_version"], 4);
        assert_eq!(json["kind"], "connector");
    }
}
