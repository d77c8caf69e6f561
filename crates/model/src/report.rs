//! Agent status reports and the per-item acknowledgements sent back.

use fleet_core::{ClusterId, ConnectorId, Error, ResourceKind};
use serde::{Deserialize, Serialize};

use crate::state::{ClusterStatus, ConnectorState};

/// One actual-state report from an agent.
///
/// `resource_version` is the agent's own counter for the resource; it is
/// compared against the row's `reported_version`, never its row version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusReport {
    Cluster {
        id: ClusterId,
        status: ClusterStatus,
        resource_version: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Connector {
        id: ConnectorId,
        state: ConnectorState,
        resource_version: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl StatusReport {
    pub const fn cluster(id: ClusterId, status: ClusterStatus, resource_version: u64) -> Self {
        Self::Cluster {
            id,
            status,
            resource_version,
            message: None,
        }
    }

    pub const fn connector(id: ConnectorId, state: ConnectorState, resource_version: u64) -> Self {
        Self::Connector {
            id,
            state,
            resource_version,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(self, text: impl Into<String>) -> Self {
        let text = Some(text.into());
        match self {
            Self::Cluster {
                id,
                status,
                resource_version,
                ..
            } => Self::Cluster {
                id,
                status,
                resource_version,
                message: text,
            },
            Self::Connector {
                id,
                state,
                resource_version,
                ..
            } => Self::Connector {
                id,
                state,
                resource_version,
                message: text,
            },
        }
    }

    pub const fn kind(&self) -> ResourceKind {
        match self {
            Self::Cluster { .. } => ResourceKind::Cluster,
            Self::Connector { .. } => ResourceKind::Connector,
        }
    }

    pub fn id_string(&self) -> String {
        match self {
            Self::Cluster { id, .. } => id.to_string(),
            Self::Connector { id, .. } => id.to_string(),
        }
    }

    pub const fn resource_version(&self) -> u64 {
        match self {
            Self::Cluster {
                resource_version, ..
            }
            | Self::Connector {
                resource_version, ..
            } => *resource_version,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Cluster { message, .. } | Self::Connector { message, .. } => message.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckOutcome {
    /// The report was applied.
    Accepted,
    /// Same version as already recorded; nothing to do.
    Unchanged,
    /// Older than what is recorded; ignored.
    Stale,
    /// The report was refused; see the error.
    Rejected,
}

impl AckOutcome {
    /// Whether the agent can stop resending the report.
    pub const fn is_settled(&self) -> bool {
        matches!(self, Self::Accepted | Self::Unchanged | Self::Stale)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportAck {
    pub kind: ResourceKind,
    pub id: String,
    pub outcome: AckOutcome,
    /// The row version after processing, when the row exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<u64>,
    /// The stored state after processing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AckError>,
}

impl ReportAck {
    pub fn settled(
        report: &StatusReport,
        outcome: AckOutcome,
        resource_version: u64,
        state: impl ToString,
    ) -> Self {
        Self {
            kind: report.kind(),
            id: report.id_string(),
            outcome,
            resource_version: Some(resource_version),
            state: Some(state.to_string()),
            error: None,
        }
    }

    pub fn rejected(report: &StatusReport, error: &Error) -> Self {
        Self {
            kind: report.kind(),
            id: report.id_string(),
            outcome: AckOutcome::Rejected,
            resource_version: None,
            state: None,
            error: Some(AckError {
                code: error.code().to_string(),
                message: error.to_string(),
            }),
        }
    }

    /// A rejection where the row was still written (forced to failed).
    #[must_use]
    pub fn with_row(mut self, resource_version: u64, state: impl ToString) -> Self {
        self.resource_version = Some(resource_version);
        self.state = Some(state.to_string());
        self
    }
}

/// Result of ingesting one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub cluster_id: ClusterId,
    pub acks: Vec<ReportAck>,
    pub accepted: usize,
    pub rejected: usize,
}

impl IngestReport {
    pub fn new(cluster_id: ClusterId, acks: Vec<ReportAck>) -> Self {
        let accepted = acks
            .iter()
            .filter(|ack| ack.outcome == AckOutcome::Accepted)
            .count();
        let rejected = acks
            .iter()
            .filter(|ack| ack.outcome == AckOutcome::Rejected)
            .count();
        Self {
            cluster_id,
            acks,
            accepted,
            rejected,
        }
    }
}
