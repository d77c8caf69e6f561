//! Immutable point-in-time views of the store.

use chrono::{DateTime, Utc};
use fleet_core::{ClusterId, ConnectorId, NamespaceId};
use fleet_model::{Cluster, Connector, Namespace};
use im::OrdMap;

/// Every cluster, namespace and connector as of `taken_at`, soft-deleted
/// rows included. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    clusters: OrdMap<ClusterId, Cluster>,
    namespaces: OrdMap<NamespaceId, Namespace>,
    connectors: OrdMap<ConnectorId, Connector>,
    taken_at: DateTime<Utc>,
}

impl StoreSnapshot {
    pub fn new(
        clusters: OrdMap<ClusterId, Cluster>,
        namespaces: OrdMap<NamespaceId, Namespace>,
        connectors: OrdMap<ConnectorId, Connector>,
        taken_at: DateTime<Utc>,
    ) -> Self {
        Self {
            clusters,
            namespaces,
            connectors,
            taken_at,
        }
    }

    pub fn from_rows(
        clusters: Vec<Cluster>,
        namespaces: Vec<Namespace>,
        connectors: Vec<Connector>,
        taken_at: DateTime<Utc>,
    ) -> Self {
        Self {
            clusters: clusters.into_iter().map(|c| (c.id, c)).collect(),
            namespaces: namespaces.into_iter().map(|n| (n.id, n)).collect(),
            connectors: connectors.into_iter().map(|c| (c.id, c)).collect(),
            taken_at,
        }
    }

    pub const fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    pub fn namespace(&self, id: NamespaceId) -> Option<&Namespace> {
        self.namespaces.get(&id)
    }

    pub fn connector(&self, id: ConnectorId) -> Option<&Connector> {
        self.connectors.get(&id)
    }

    pub fn clusters(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.values()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &Namespace> {
        self.namespaces.values()
    }

    pub fn connectors(&self) -> impl Iterator<Item = &Connector> {
        self.connectors.values()
    }

    /// Connectors placed on `cluster_id`, oldest first.
    pub fn connectors_on_cluster(&self, cluster_id: ClusterId) -> impl Iterator<Item = &Connector> {
        self.connectors
            .values()
            .filter(move |connector| connector.cluster_id == Some(cluster_id))
    }
}
