//! Property-based tests for the cluster and connector state machines.
//!
//! Uses proptest to validate:
//! - Reported transitions agree with the transition tables
//! - Terminal states absorb every event
//! - Failed transitions never produce a state

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use fleet_core::Error;
use fleet_model::{ClusterEvent, ClusterStatus, ConnectorEvent, ConnectorState};
use proptest::prelude::*;

fn cluster_status() -> impl Strategy<Value = ClusterStatus> {
    prop::sample::select(ClusterStatus::ALL.to_vec())
}

fn connector_state() -> impl Strategy<Value = ConnectorState> {
    prop::sample::select(ConnectorState::ALL.to_vec())
}

fn cluster_event() -> impl Strategy<Value = ClusterEvent> {
    prop_oneof![
        cluster_status().prop_map(ClusterEvent::Reported),
        Just(ClusterEvent::DeprovisionRequested),
        Just(ClusterEvent::Stalled),
        Just(ClusterEvent::ReportRejected),
    ]
}

fn connector_event() -> impl Strategy<Value = ConnectorEvent> {
    prop_oneof![
        connector_state().prop_map(ConnectorEvent::Reported),
        Just(ConnectorEvent::Assigned),
        Just(ConnectorEvent::Retry),
        Just(ConnectorEvent::Stalled),
        Just(ConnectorEvent::ReportRejected),
    ]
}

/// Agent-report table for clusters, written out independently.
fn cluster_report_allowed(from: ClusterStatus, to: ClusterStatus) -> bool {
    use ClusterStatus::*;
    if from == to {
        return true;
    }
    match from {
        Provisioning => matches!(to, Provisioned | Ready | Failed),
        Provisioned => matches!(to, Ready | Failed),
        Ready => matches!(to, Failed),
        Deprovisioning => matches!(to, Deleted | Failed),
        Deleted | Failed => false,
    }
}

/// Agent-report table for connectors, written out independently.
fn connector_report_allowed(from: ConnectorState, to: ConnectorState) -> bool {
    use ConnectorState::*;
    if to == Assigning {
        return false;
    }
    if from == to {
        return true;
    }
    match from {
        Assigning => matches!(to, Assigned | Deleted | Failed),
        Assigned => matches!(to, Updating | Ready | Stopped | Deleted | Failed),
        Updating => matches!(to, Ready | Stopped | Deleted | Failed),
        Ready => matches!(to, Updating | Stopped | Deleted | Failed),
        Stopped => matches!(to, Updating | Ready | Deleted | Failed),
        Failed => matches!(to, Deleted),
        Deleted => false,
    }
}

proptest! {
    /// Property: cluster reports follow the table exactly
    #[test]
    fn prop_cluster_reports_match_table(from in cluster_status(), to in cluster_status()) {
        let result = from.transition(ClusterEvent::Reported(to));
        if cluster_report_allowed(from, to) {
            prop_assert_eq!(result.ok(), Some(to));
        } else {
            let is_invalid_transition = matches!(result, Err(Error::InvalidTransition { .. }));
            prop_assert!(is_invalid_transition);
        }
    }

    /// Property: nothing moves a cluster out of a terminal status
    #[test]
    fn prop_cluster_terminal_absorbs(event in cluster_event()) {
        for terminal in [ClusterStatus::Failed, ClusterStatus::Deleted] {
            match terminal.transition(event) {
                Ok(next) => prop_assert_eq!(next, terminal),
                Err(error) => prop_assert_eq!(error.code(), "invalid_transition"),
            }
        }
    }

    /// Property: any non-terminal cluster can be failed by the control plane
    #[test]
    fn prop_cluster_failure_reachable(from in cluster_status()) {
        let result = from.transition(ClusterEvent::Stalled);
        prop_assert_eq!(result.is_ok(), !from.is_terminal());
    }

    /// Property: connector reports follow the table exactly
    #[test]
    fn prop_connector_reports_match_table(from in connector_state(), to in connector_state()) {
        let result = ConnectorState::transition(Some(from), ConnectorEvent::Reported(to));
        if connector_report_allowed(from, to) {
            prop_assert_eq!(result.ok(), Some(to));
        } else {
            prop_assert!(result.is_err());
        }
    }

    /// Property: a deleted connector absorbs every event
    #[test]
    fn prop_connector_deleted_absorbs(event in connector_event()) {
        match ConnectorState::transition(Some(ConnectorState::Deleted), event) {
            Ok(next) => prop_assert_eq!(next, ConnectorState::Deleted),
            Err(error) => prop_assert_eq!(error.code(), "invalid_transition"),
        }
    }

    /// Property: an unassigned connector only accepts an assignment
    #[test]
    fn prop_unassigned_only_accepts_assignment(event in connector_event()) {
        let result = ConnectorState::transition(None, event);
        if event == ConnectorEvent::Assigned {
            prop_assert_eq!(result.ok(), Some(ConnectorState::Assigning));
        } else {
            prop_assert!(result.is_err());
        }
    }
}
