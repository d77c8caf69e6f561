//! Cluster and connector state machines.
//!
//! Transitions are pure: `(current, event) -> next` or `InvalidTransition`.
//! Nothing here touches storage; callers decide what to persist.

use std::fmt;

use fleet_core::{Error, ResourceKind, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Cluster
// ============================================================================

/// Lifecycle status of a data-plane cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterStatus {
    #[serde(rename = "cluster_provisioning")]
    Provisioning,
    #[serde(rename = "cluster_provisioned")]
    Provisioned,
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "deprovisioning")]
    Deprovisioning,
    #[serde(rename = "deleted")]
    Deleted,
    #[serde(rename = "failed")]
    Failed,
}

impl ClusterStatus {
    pub const ALL: [Self; 6] = [
        Self::Provisioning,
        Self::Provisioned,
        Self::Ready,
        Self::Deprovisioning,
        Self::Deleted,
        Self::Failed,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "cluster_provisioning",
            Self::Provisioned => "cluster_provisioned",
            Self::Ready => "ready",
            Self::Deprovisioning => "deprovisioning",
            Self::Deleted => "deleted",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Deleted)
    }

    /// States the agent is expected to move out of on its own.
    pub const fn is_settling(&self) -> bool {
        matches!(
            self,
            Self::Provisioning | Self::Provisioned | Self::Deprovisioning
        )
    }

    /// Statuses a cluster row may be created with.
    pub const fn is_initial(&self) -> bool {
        matches!(self, Self::Provisioning | Self::Provisioned | Self::Ready)
    }

    /// Check if an agent-driven move to `target` is valid.
    ///
    /// `Deprovisioning` is never reachable this way; it is entered only
    /// through [`ClusterEvent::DeprovisionRequested`].
    pub fn can_transition_to(&self, target: Self) -> bool {
        use ClusterStatus::*;
        matches!(
            (self, target),
            (Provisioning, Provisioned)
                | (Provisioning, Ready) // forward skip
                | (Provisioning, Failed)
                | (Provisioned, Ready)
                | (Provisioned, Failed)
                | (Ready, Failed)
                | (Deprovisioning, Deleted)
                | (Deprovisioning, Failed)
        )
    }

    pub fn valid_transitions(&self) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|target| self.can_transition_to(*target))
            .collect()
    }

    /// Apply `event` to this status.
    pub fn transition(self, event: ClusterEvent) -> Result<Self> {
        let next = match event {
            ClusterEvent::Reported(target) if target == self => Some(self),
            ClusterEvent::Reported(Self::Deprovisioning) => None,
            ClusterEvent::Reported(target) => self.can_transition_to(target).then_some(target),
            ClusterEvent::DeprovisionRequested => match self {
                Self::Deprovisioning => Some(self),
                status if status.is_terminal() => None,
                _ => Some(Self::Deprovisioning),
            },
            ClusterEvent::Stalled | ClusterEvent::ReportRejected => {
                (!self.is_terminal()).then_some(Self::Failed)
            }
        };

        next.ok_or_else(|| Error::invalid_transition(ResourceKind::Cluster, self, event))
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user wants a cluster to end up as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterDesiredState {
    Ready,
    Deleted,
}

impl fmt::Display for ClusterDesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ready => "ready",
            Self::Deleted => "deleted",
        })
    }
}

/// Events that drive the cluster state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterEvent {
    /// The agent reported a status.
    Reported(ClusterStatus),
    /// The user asked for the cluster to be torn down.
    DeprovisionRequested,
    /// The agent made no progress within the staleness threshold.
    Stalled,
    /// The agent sent a report the state machine refused.
    ReportRejected,
}

impl fmt::Display for ClusterEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reported(status) => write!(f, "reported({status})"),
            Self::DeprovisionRequested => f.write_str("deprovision_requested"),
            Self::Stalled => f.write_str("stalled"),
            Self::ReportRejected => f.write_str("report_rejected"),
        }
    }
}

// ============================================================================
// Connector
// ============================================================================

/// What the user wants a connector to end up as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorDesiredState {
    Ready,
    Stopped,
    Deleted,
}

impl fmt::Display for ConnectorDesiredState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ready => "ready",
            Self::Stopped => "stopped",
            Self::Deleted => "deleted",
        })
    }
}

/// Last actual state of a connector, as reported by its agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorState {
    Assigning,
    Assigned,
    Updating,
    Ready,
    Stopped,
    Deleted,
    Failed,
}

impl ConnectorState {
    pub const ALL: [Self; 7] = [
        Self::Assigning,
        Self::Assigned,
        Self::Updating,
        Self::Ready,
        Self::Stopped,
        Self::Deleted,
        Self::Failed,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Assigning => "assigning",
            Self::Assigned => "assigned",
            Self::Updating => "updating",
            Self::Ready => "ready",
            Self::Stopped => "stopped",
            Self::Deleted => "deleted",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted)
    }

    pub const fn is_settling(&self) -> bool {
        matches!(self, Self::Assigning | Self::Assigned | Self::Updating)
    }

    /// Whether this actual state fulfils `desired`.
    pub const fn satisfies(&self, desired: ConnectorDesiredState) -> bool {
        matches!(
            (self, desired),
            (Self::Ready, ConnectorDesiredState::Ready)
                | (Self::Stopped, ConnectorDesiredState::Stopped)
                | (Self::Deleted, ConnectorDesiredState::Deleted)
        )
    }

    /// Check if an agent report moving to `target` is valid.
    pub fn can_transition_to(&self, target: Self) -> bool {
        use ConnectorState::*;
        matches!(
            (self, target),
            (Assigning, Assigned | Deleted | Failed)
                | (Assigned, Updating | Ready | Stopped | Deleted | Failed)
                | (Updating, Ready | Stopped | Deleted | Failed)
                | (Ready, Updating | Stopped | Deleted | Failed)
                | (Stopped, Updating | Ready | Deleted | Failed)
                | (Failed, Deleted)
        )
    }

    pub fn valid_transitions(&self) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|target| self.can_transition_to(*target))
            .collect()
    }

    /// Apply `event` to an optional current state.
    ///
    /// `None` means the connector has never been assigned.
    pub fn transition(current: Option<Self>, event: ConnectorEvent) -> Result<Self> {
        use ConnectorState::*;

        let next = match (current, event) {
            (None | Some(Failed | Assigning), ConnectorEvent::Assigned) => Some(Assigning),
            (Some(Failed), ConnectorEvent::Retry) => Some(Assigning),
            (Some(_), ConnectorEvent::Reported(Assigning)) => None,
            (Some(state), ConnectorEvent::Reported(target)) if state == target => Some(state),
            (Some(state), ConnectorEvent::Reported(target)) => {
                state.can_transition_to(target).then_some(target)
            }
            (Some(state), ConnectorEvent::Stalled | ConnectorEvent::ReportRejected) => {
                (!state.is_terminal()).then_some(Failed)
            }
            _ => None,
        };

        next.ok_or_else(|| {
            let from = current.map_or("unassigned", |state| state.as_str());
            Error::invalid_transition(ResourceKind::Connector, from, event)
        })
    }
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that drive the connector state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorEvent {
    /// The resolver placed the connector in a namespace.
    Assigned,
    /// The agent reported a state.
    Reported(ConnectorState),
    /// The user asked to retry a failed connector.
    Retry,
    /// The agent made no progress within the staleness threshold.
    Stalled,
    /// The agent sent a report the state machine refused.
    ReportRejected,
}

impl fmt::Display for ConnectorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assigned => f.write_str("assigned"),
            Self::Reported(state) => write!(f, "reported({state})"),
            Self::Retry => f.write_str("retry"),
            Self::Stalled => f.write_str("stalled"),
            Self::ReportRejected => f.write_str("report_rejected"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_cluster_happy_path() {
        let status = ClusterStatus::Provisioning
            .transition(ClusterEvent::Reported(ClusterStatus::Provisioned))
            .unwrap()
            .transition(ClusterEvent::Reported(ClusterStatus::Ready))
            .unwrap();
        assert_eq!(status, ClusterStatus::Ready);
    }

    #[test]
    fn test_cluster_forward_skip_and_heartbeat() {
        assert_eq!(
            ClusterStatus::Provisioning
                .transition(ClusterEvent::Reported(ClusterStatus::Ready))
                .unwrap(),
            ClusterStatus::Ready
        );
        assert_eq!(
            ClusterStatus::Ready
                .transition(ClusterEvent::Reported(ClusterStatus::Ready))
                .unwrap(),
            ClusterStatus::Ready
        );
    }

    #[test]
    fn test_cluster_no_backwards_moves() {
        let err = ClusterStatus::Ready
            .transition(ClusterEvent::Reported(ClusterStatus::Provisioning))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn test_cluster_failed_is_absorbing() {
        for target in ClusterStatus::ALL {
            if target == ClusterStatus::Failed {
                continue;
            }
            assert!(ClusterStatus::Failed
                .transition(ClusterEvent::Reported(target))
                .is_err());
        }
        assert!(ClusterStatus::Failed.transition(ClusterEvent::Stalled).is_err());
        assert!(ClusterStatus::Failed
            .transition(ClusterEvent::DeprovisionRequested)
            .is_err());
    }

    #[test]
    fn test_cluster_deprovision_only_on_request() {
        assert!(ClusterStatus::Ready
            .transition(ClusterEvent::Reported(ClusterStatus::Deprovisioning))
            .is_err());
        assert_eq!(
            ClusterStatus::Ready
                .transition(ClusterEvent::DeprovisionRequested)
                .unwrap(),
            ClusterStatus::Deprovisioning
        );
        assert_eq!(
            ClusterStatus::Deprovisioning
                .transition(ClusterEvent::Reported(ClusterStatus::Deleted))
                .unwrap(),
            ClusterStatus::Deleted
        );
    }

    #[test]
    fn test_cluster_valid_transitions() {
        let transitions = ClusterStatus::Provisioning.valid_transitions();
        assert!(transitions.contains(&ClusterStatus::Ready));
        assert!(transitions.contains(&ClusterStatus::Failed));
        assert!(!transitions.contains(&ClusterStatus::Deprovisioning));
        assert!(ClusterStatus::Deleted.valid_transitions().is_empty());
    }

    #[test]
    fn test_cluster_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ClusterStatus::Provisioning).unwrap(),
            "\"cluster_provisioning\""
        );
        let parsed: ClusterStatus = serde_json::from_str("\"ready\"").unwrap();
        assert_eq!(parsed, ClusterStatus::Ready);
    }

    #[test]
    fn test_connector_lifecycle() {
        let mut state = ConnectorState::transition(None, ConnectorEvent::Assigned).unwrap();
        for target in [
            ConnectorState::Assigned,
            ConnectorState::Updating,
            ConnectorState::Ready,
            ConnectorState::Stopped,
            ConnectorState::Deleted,
        ] {
            state = ConnectorState::transition(Some(state), ConnectorEvent::Reported(target))
                .unwrap();
        }
        assert_eq!(state, ConnectorState::Deleted);
    }

    #[test]
    fn test_connector_agents_cannot_report_assigning() {
        for state in ConnectorState::ALL {
            assert!(ConnectorState::transition(
                Some(state),
                ConnectorEvent::Reported(ConnectorState::Assigning)
            )
            .is_err());
        }
    }

    #[test]
    fn test_connector_reports_need_an_assignment() {
        let err = ConnectorState::transition(
            None,
            ConnectorEvent::Reported(ConnectorState::Ready),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid connector transition from 'unassigned' on 'reported(ready)'"
        );
    }

    #[test]
    fn test_connector_retry_only_from_failed() {
        assert_eq!(
            ConnectorState::transition(Some(ConnectorState::Failed), ConnectorEvent::Retry)
                .unwrap(),
            ConnectorState::Assigning
        );
        assert!(
            ConnectorState::transition(Some(ConnectorState::Ready), ConnectorEvent::Retry)
                .is_err()
        );
        assert!(ConnectorState::transition(None, ConnectorEvent::Retry).is_err());
    }

    #[test]
    fn test_connector_assigning_cannot_skip_to_ready() {
        assert!(ConnectorState::transition(
            Some(ConnectorState::Assigning),
            ConnectorEvent::Reported(ConnectorState::Ready)
        )
        .is_err());
    }

    #[test]
    fn test_connector_satisfies() {
        assert!(ConnectorState::Ready.satisfies(ConnectorDesiredState::Ready));
        assert!(ConnectorState::Stopped.satisfies(ConnectorDesiredState::Stopped));
        assert!(!ConnectorState::Updating.satisfies(ConnectorDesiredState::Ready));
        assert!(!ConnectorState::Failed.satisfies(ConnectorDesiredState::Deleted));
    }
}
