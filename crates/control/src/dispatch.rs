//! Work dispatch view: what an agent has to realise next.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fleet_core::{ClusterId, ConnectorId, ConnectorTypeId, Error, NamespaceId, ResourceKind, Result};
use fleet_model::{
    Channel, Cluster, ClusterDesiredState, ClusterStatus, Connector, ConnectorDesiredState,
    ConnectorState, KafkaConnectionSettings, PendingAction, Reconcilable,
    SchemaRegistryConnectionSettings, ServiceAccount,
};
use fleet_store::{DesiredStateStore, StoreSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The cluster's own pending work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterWork {
    pub id: ClusterId,
    pub desired: ClusterDesiredState,
    pub status: ClusterStatus,
    pub resource_version: u64,
    pub reported_version: u64,
    pub pending: Option<PendingAction>,
}

/// Everything an agent needs to deploy one connector, secrets included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorWork {
    pub id: ConnectorId,
    pub name: String,
    pub connector_type_id: ConnectorTypeId,
    pub namespace_id: NamespaceId,
    pub channel: Channel,
    pub desired: ConnectorDesiredState,
    pub actual: Option<ConnectorState>,
    pub kafka: KafkaConnectionSettings,
    pub schema_registry: Option<SchemaRegistryConnectionSettings>,
    pub service_account: ServiceAccount,
    pub connector: Value,
    pub resource_version: u64,
    pub reported_version: u64,
    pub pending: Option<PendingAction>,
}

/// Pending work for one cluster, read from a single snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSnapshot {
    pub cluster_id: ClusterId,
    pub cluster: Option<ClusterWork>,
    pub connectors: Vec<ConnectorWork>,
    pub taken_at: DateTime<Utc>,
}

impl WorkSnapshot {
    pub fn is_empty(&self) -> bool {
        self.cluster.is_none() && self.connectors.is_empty()
    }
}

impl From<&Cluster> for ClusterWork {
    fn from(cluster: &Cluster) -> Self {
        Self {
            id: cluster.id,
            desired: cluster.desired,
            status: cluster.status,
            resource_version: cluster.meta.resource_version,
            reported_version: cluster.meta.reported_version,
            pending: cluster.meta.pending,
        }
    }
}

impl From<&Connector> for ConnectorWork {
    fn from(connector: &Connector) -> Self {
        Self {
            id: connector.id,
            name: connector.name.clone(),
            connector_type_id: connector.connector_type_id.clone(),
            namespace_id: connector.namespace_id,
            channel: connector.channel,
            desired: connector.desired,
            actual: connector.actual,
            kafka: connector.kafka.clone(),
            schema_registry: connector.schema_registry.clone(),
            service_account: connector.service_account.clone(),
            connector: connector.connector.clone(),
            resource_version: connector.meta.resource_version,
            reported_version: connector.meta.reported_version,
            pending: connector.meta.pending,
        }
    }
}

/// Whether the agent has to act on the cluster itself.
pub fn cluster_needs_work(cluster: &Cluster) -> bool {
    if cluster.meta.is_deleted() {
        return false;
    }
    let teardown = cluster.desired == ClusterDesiredState::Deleted && !cluster.is_removed();
    teardown || cluster.is_settling() || cluster.meta.pending.is_some()
}

/// Whether the agent has to act on the connector.
pub fn connector_needs_work(connector: &Connector) -> bool {
    if connector.meta.is_deleted() || connector.cluster_id.is_none() {
        return false;
    }
    !connector.is_converged()
        || connector.actual == Some(ConnectorState::Assigning)
        || connector.meta.pending.is_some()
}

pub struct WorkDispatchView {
    store: Arc<dyn DesiredStateStore>,
}

impl WorkDispatchView {
    pub fn new(store: Arc<dyn DesiredStateStore>) -> Self {
        Self { store }
    }

    pub async fn list_pending_work(&self, cluster_id: ClusterId) -> Result<WorkSnapshot> {
        let snapshot = self.store.snapshot().await?;
        pending_work(&snapshot, cluster_id)
    }
}

/// Pure projection of a snapshot onto one cluster's work.
pub fn pending_work(snapshot: &StoreSnapshot, cluster_id: ClusterId) -> Result<WorkSnapshot> {
    let cluster = snapshot
        .cluster(cluster_id)
        .ok_or_else(|| Error::not_found(ResourceKind::Cluster, cluster_id.to_string()))?;

    let connectors = snapshot
        .connectors_on_cluster(cluster_id)
        .filter(|connector| connector_needs_work(connector))
        .map(ConnectorWork::from)
        .collect();

    Ok(WorkSnapshot {
        cluster_id,
        cluster: cluster_needs_work(cluster).then(|| ClusterWork::from(cluster)),
        connectors,
        taken_at: snapshot.taken_at(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use fleet_model::{ClusterSpec, ConnectorSpec};

    use super::*;

    fn cluster(status: ClusterStatus) -> Cluster {
        let spec = ClusterSpec::new("aws", "us-east-1").with_status(status);
        let mut cluster = Cluster::new(spec, Utc::now()).unwrap();
        cluster.meta.resource_version = 1;
        cluster
    }

    fn connector_on(cluster: &Cluster, actual: Option<ConnectorState>) -> Connector {
        let spec = ConnectorSpec::new("sink", "log_sink_0.1", NamespaceId::new(), "kafka:9092");
        let mut connector = Connector::new(spec, Utc::now()).unwrap();
        connector.cluster_id = actual.map(|_| cluster.id);
        connector.actual = actual;
        connector
    }

    #[test]
    fn test_ready_cluster_without_pending_has_no_work() {
        let ready = cluster(ClusterStatus::Ready);
        assert!(!cluster_needs_work(&ready));

        let provisioning = cluster(ClusterStatus::Provisioning);
        assert!(cluster_needs_work(&provisioning));

        let mut deleting = cluster(ClusterStatus::Ready);
        deleting.desired = ClusterDesiredState::Deleted;
        assert!(cluster_needs_work(&deleting));
    }

    #[test]
    fn test_connector_work_selection() {
        let host = cluster(ClusterStatus::Ready);

        assert!(!connector_needs_work(&connector_on(&host, None)));
        assert!(connector_needs_work(&connector_on(&host, Some(ConnectorState::Assigning))));
        assert!(connector_needs_work(&connector_on(&host, Some(ConnectorState::Updating))));
        assert!(!connector_needs_work(&connector_on(&host, Some(ConnectorState::Ready))));

        let mut pending = connector_on(&host, Some(ConnectorState::Ready));
        pending.meta.pending = Some(PendingAction::Delete);
        assert!(connector_needs_work(&pending));

        let mut deleted = connector_on(&host, Some(ConnectorState::Updating));
        deleted.meta.soft_delete(Utc::now());
        assert!(!connector_needs_work(&deleted));
    }

    #[test]
    fn test_pending_work_is_scoped_to_cluster() {
        let mine = cluster(ClusterStatus::Ready);
        let theirs = cluster(ClusterStatus::Ready);
        let wanted = connector_on(&mine, Some(ConnectorState::Assigning));
        let foreign = connector_on(&theirs, Some(ConnectorState::Assigning));
        let settled = connector_on(&mine, Some(ConnectorState::Ready));

        let snapshot = StoreSnapshot::from_rows(
            vec![mine.clone(), theirs],
            Vec::new(),
            vec![wanted.clone(), foreign, settled],
            Utc::now(),
        );
        let work = pending_work(&snapshot, mine.id).unwrap();

        assert_eq!(work.cluster, None);
        let ids: Vec<_> = work.connectors.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![wanted.id]);
        assert_eq!(work.taken_at, snapshot.taken_at());
    }

    #[test]
    fn test_work_items_carry_secrets_and_versions() {
        let mine = cluster(ClusterStatus::Ready);
        let mut wanted = connector_on(&mine, Some(ConnectorState::Assigning));
        wanted.kafka.client_secret = "s3cret".to_string();
        wanted.meta.resource_version = 4;

        let snapshot =
            StoreSnapshot::from_rows(vec![mine.clone()], Vec::new(), vec![wanted], Utc::now());
        let work = pending_work(&snapshot, mine.id).unwrap();
        let item = work.connectors.first().unwrap();

        assert_eq!(item.kafka.client_secret, "s3cret");
        assert_eq!(item.resource_version, 4);
    }

    #[test]
    fn test_unknown_cluster_is_not_found() {
        let snapshot = StoreSnapshot::from_rows(Vec::new(), Vec::new(), Vec::new(), Utc::now());
        let error = pending_work(&snapshot, ClusterId::new()).unwrap_err();
        assert_eq!(error.code(), "not_found");
    }
}
