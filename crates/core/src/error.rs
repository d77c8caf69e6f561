//! Error taxonomy for control plane operations.
//!
//! Every fallible operation in the workspace returns one of these variants.
//! Nothing in the control plane panics on bad input.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of resource an error or record refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Cluster,
    Namespace,
    Connector,
    ConnectorType,
}

impl ResourceKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cluster => "cluster",
            Self::Namespace => "namespace",
            Self::Connector => "connector",
            Self::ConnectorType => "connector_type",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error type for control plane operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("{kind} '{key}' conflicts: {reason}")]
    Conflict {
        kind: ResourceKind,
        key: String,
        reason: String,
    },

    #[error("{kind} '{id}' version mismatch: expected {expected}, found {actual}")]
    VersionMismatch {
        kind: ResourceKind,
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("invalid {kind} transition from '{from}' on '{event}'")]
    InvalidTransition {
        kind: ResourceKind,
        from: String,
        event: String,
    },

    #[error("{kind} '{id}' is not owned by cluster '{cluster_id}'")]
    NotOwnedByCluster {
        kind: ResourceKind,
        id: String,
        cluster_id: String,
    },

    #[error("cluster '{cluster_id}' is not ready (status: {status})")]
    ClusterNotReady { cluster_id: String, status: String },

    #[error("namespace '{namespace_id}' is at capacity ({current}/{max} connectors)")]
    CapacityExceeded {
        namespace_id: String,
        current: usize,
        max: usize,
    },

    #[error("invalid configuration: {}", violations.join("; "))]
    InvalidConfiguration { violations: Vec<String> },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: ResourceKind, id: String },

    #[error("invalid {kind} id '{value}': {reason}")]
    InvalidId {
        kind: ResourceKind,
        value: String,
        reason: String,
    },

    #[error("storage operation '{operation}' failed: {reason}")]
    Storage { operation: String, reason: String },

    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    pub fn conflict(kind: ResourceKind, key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn version_mismatch(
        kind: ResourceKind,
        id: impl Into<String>,
        expected: u64,
        actual: u64,
    ) -> Self {
        Self::VersionMismatch {
            kind,
            id: id.into(),
            expected,
            actual,
        }
    }

    pub fn invalid_transition(
        kind: ResourceKind,
        from: impl fmt::Display,
        event: impl fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            kind,
            from: from.to_string(),
            event: event.to_string(),
        }
    }

    pub fn not_owned_by_cluster(
        kind: ResourceKind,
        id: impl Into<String>,
        cluster_id: impl Into<String>,
    ) -> Self {
        Self::NotOwnedByCluster {
            kind,
            id: id.into(),
            cluster_id: cluster_id.into(),
        }
    }

    pub fn cluster_not_ready(cluster_id: impl Into<String>, status: impl fmt::Display) -> Self {
        Self::ClusterNotReady {
            cluster_id: cluster_id.into(),
            status: status.to_string(),
        }
    }

    pub fn capacity_exceeded(namespace_id: impl Into<String>, current: usize, max: usize) -> Self {
        Self::CapacityExceeded {
            namespace_id: namespace_id.into(),
            current,
            max,
        }
    }

    /// A single-violation configuration error.
    pub fn invalid_configuration(violation: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            violations: vec![violation.into()],
        }
    }

    pub fn not_found(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn invalid_id(
        kind: ResourceKind,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidId {
            kind,
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn storage(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code, used in problem documents and report acks.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "conflict",
            Self::VersionMismatch { .. } => "version_mismatch",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NotOwnedByCluster { .. } => "not_owned_by_cluster",
            Self::ClusterNotReady { .. } => "cluster_not_ready",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::InvalidConfiguration { .. } => "invalid_configuration",
            Self::NotFound { .. } => "not_found",
            Self::InvalidId { .. } => "invalid_id",
            Self::Storage { .. } => "storage",
            Self::InvalidConfig { .. } => "invalid_config",
        }
    }

    /// Whether retrying the same operation later could succeed.
    ///
    /// Version races, unready clusters, full namespaces and storage hiccups
    /// clear up on their own. Everything else needs a different request.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::VersionMismatch { .. }
                | Self::ClusterNotReady { .. }
                | Self::CapacityExceeded { .. }
                | Self::Storage { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_snake_case() {
        let errors = [
            Error::conflict(ResourceKind::Namespace, "ns-a", "name taken"),
            Error::version_mismatch(ResourceKind::Connector, "c1", 3, 4),
            Error::invalid_transition(ResourceKind::Cluster, "failed", "reported(ready)"),
            Error::not_owned_by_cluster(ResourceKind::Connector, "c1", "k1"),
            Error::cluster_not_ready("k1", "cluster_provisioning"),
            Error::capacity_exceeded("ns1", 4, 4),
            Error::invalid_configuration("missing field"),
            Error::not_found(ResourceKind::Cluster, "k1"),
            Error::invalid_id(ResourceKind::Cluster, "nope", "bad length"),
            Error::storage("create_cluster", "disk full"),
            Error::invalid_config("interval must be positive"),
        ];

        for error in &errors {
            let code = error.code();
            assert!(code.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{code}");
        }
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::version_mismatch(ResourceKind::Connector, "c1", 1, 2).is_recoverable());
        assert!(Error::cluster_not_ready("k1", "cluster_provisioning").is_recoverable());
        assert!(Error::capacity_exceeded("ns1", 4, 4).is_recoverable());
        assert!(Error::storage("snapshot", "timeout").is_recoverable());

        assert!(!Error::not_found(ResourceKind::Cluster, "k1").is_recoverable());
        assert!(!Error::invalid_configuration("bad").is_recoverable());
        assert!(!Error::invalid_transition(ResourceKind::Cluster, "failed", "x").is_recoverable());
    }

    #[test]
    fn test_display_includes_context() {
        let error = Error::version_mismatch(ResourceKind::Connector, "c1", 3, 4);
        assert_eq!(
            error.to_string(),
            "connector 'c1' version mismatch: expected 3, found 4"
        );

        let error = Error::InvalidConfiguration {
            violations: vec!["/a: required".to_string(), "/b: too long".to_string()],
        };
        assert_eq!(error.to_string(), "invalid configuration: /a: required; /b: too long");
    }
}
