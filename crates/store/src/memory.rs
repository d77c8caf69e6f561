//! In-process store over persistent maps.
//!
//! Writers never hold a lock while they work. Each write builds the next
//! state on a private O(1) copy of the tables, then publishes it only if no
//! other write was published in the meantime; otherwise it re-reads and
//! tries again. Natural keys and per-namespace assignment counts are
//! indexed, so every check inside a write is O(log n).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use fleet_core::{
    ClusterId, ConnectorId, ConnectorTypeId, Error, NamespaceId, ResourceKind, Result,
};
use fleet_model::{
    Cluster, ClusterDesiredState, Connector, ConnectorDesiredState, ConnectorPatch,
    ConnectorType, Namespace, NamespacePatch,
};
use im::OrdMap;
use tokio::sync::RwLock;
use tracing::trace;

use crate::snapshot::StoreSnapshot;
use crate::store::{check_version, ensure_live, next_version, DesiredStateStore};

type NamespaceKey = (ClusterId, String);
type ConnectorKey = (NamespaceId, String);

fn namespace_key(namespace: &Namespace) -> NamespaceKey {
    (namespace.cluster_id, namespace.name.clone())
}

fn connector_key(connector: &Connector) -> ConnectorKey {
    (connector.namespace_id, connector.name.clone())
}

/// Counts toward its namespace's capacity.
fn occupies(connector: &Connector) -> bool {
    !connector.meta.is_deleted() && connector.is_assigned()
}

#[derive(Debug, Clone, Default)]
struct Tables {
    /// Bumped on every published write.
    generation: u64,
    clusters: OrdMap<ClusterId, Cluster>,
    namespaces: OrdMap<NamespaceId, Namespace>,
    namespace_keys: OrdMap<NamespaceKey, NamespaceId>,
    connectors: OrdMap<ConnectorId, Connector>,
    connector_keys: OrdMap<ConnectorKey, ConnectorId>,
    assigned: OrdMap<NamespaceId, usize>,
    connector_types: OrdMap<ConnectorTypeId, ConnectorType>,
}

impl Tables {
    fn cluster(&self, id: ClusterId) -> Result<&Cluster> {
        self.clusters
            .get(&id)
            .ok_or_else(|| Error::not_found(ResourceKind::Cluster, id.to_string()))
    }

    fn namespace(&self, id: NamespaceId) -> Result<&Namespace> {
        self.namespaces
            .get(&id)
            .ok_or_else(|| Error::not_found(ResourceKind::Namespace, id.to_string()))
    }

    fn connector(&self, id: ConnectorId) -> Result<&Connector> {
        self.connectors
            .get(&id)
            .ok_or_else(|| Error::not_found(ResourceKind::Connector, id.to_string()))
    }

    fn ensure_namespace_key_free(&self, candidate: &Namespace) -> Result<()> {
        if candidate.meta.is_deleted() {
            return Ok(());
        }
        match self.namespace_keys.get(&namespace_key(candidate)) {
            Some(owner) if *owner != candidate.id => Err(Error::conflict(
                ResourceKind::Namespace,
                candidate.natural_key(),
                "a namespace with this name already exists on the cluster",
            )),
            _ => Ok(()),
        }
    }

    fn ensure_connector_key_free(&self, candidate: &Connector) -> Result<()> {
        if candidate.meta.is_deleted() {
            return Ok(());
        }
        match self.connector_keys.get(&connector_key(candidate)) {
            Some(owner) if *owner != candidate.id => Err(Error::conflict(
                ResourceKind::Connector,
                candidate.natural_key(),
                "a connector with this name already exists in the namespace",
            )),
            _ => Ok(()),
        }
    }

    fn assigned_in(&self, namespace_id: NamespaceId, excluding: Option<ConnectorId>) -> usize {
        let total = self.assigned.get(&namespace_id).copied().unwrap_or(0);
        let counted = excluding
            .and_then(|id| self.connectors.get(&id))
            .is_some_and(|c| occupies(c) && c.namespace_id == namespace_id);
        total.saturating_sub(usize::from(counted))
    }

    fn write_cluster(&mut self, mut cluster: Cluster, expected: u64) -> Result<Cluster> {
        let id = cluster.id.to_string();
        cluster.meta.resource_version = next_version(ResourceKind::Cluster, &id, expected)?;
        cluster.meta.updated_at = Utc::now();
        self.clusters.insert(cluster.id, cluster.clone());
        Ok(cluster)
    }

    fn write_namespace(&mut self, mut namespace: Namespace, expected: u64) -> Result<Namespace> {
        let id = namespace.id.to_string();
        namespace.meta.resource_version = next_version(ResourceKind::Namespace, &id, expected)?;
        namespace.meta.updated_at = Utc::now();

        if let Some(previous) = self.namespaces.insert(namespace.id, namespace.clone()) {
            if !previous.meta.is_deleted() {
                self.namespace_keys.remove(&namespace_key(&previous));
            }
        }
        if !namespace.meta.is_deleted() {
            self.namespace_keys.insert(namespace_key(&namespace), namespace.id);
        }
        Ok(namespace)
    }

    fn write_connector(&mut self, mut connector: Connector, expected: u64) -> Result<Connector> {
        let id = connector.id.to_string();
        connector.meta.resource_version = next_version(ResourceKind::Connector, &id, expected)?;
        connector.meta.updated_at = Utc::now();

        if let Some(previous) = self.connectors.insert(connector.id, connector.clone()) {
            self.unindex_connector(&previous);
        }
        self.index_connector(&connector);
        Ok(connector)
    }

    fn index_connector(&mut self, connector: &Connector) {
        if connector.meta.is_deleted() {
            return;
        }
        self.connector_keys.insert(connector_key(connector), connector.id);
        if occupies(connector) {
            let count = self.assigned.get(&connector.namespace_id).copied().unwrap_or(0);
            self.assigned.insert(connector.namespace_id, count + 1);
        }
    }

    fn unindex_connector(&mut self, connector: &Connector) {
        if connector.meta.is_deleted() {
            return;
        }
        self.connector_keys.remove(&connector_key(connector));
        if occupies(connector) {
            let count = self.assigned.get(&connector.namespace_id).copied().unwrap_or(0);
            self.assigned
                .insert(connector.namespace_id, count.saturating_sub(1));
        }
    }
}

/// In-memory store for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    root: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// A consistent copy of every table. O(1).
    async fn current(&self) -> Tables {
        self.root.read().await.clone()
    }

    /// Apply `change` to a private copy and publish it.
    ///
    /// The lock is held only to compare generations and swap the root. A
    /// write that lost to another publish recomputes against the new state,
    /// so rows it does not touch never make it fail.
    async fn commit<T, F>(&self, mut change: F) -> Result<T>
    where
        F: FnMut(&mut Tables) -> Result<T> + Send,
        T: Send,
    {
        let mut attempts: u32 = 0;
        loop {
            let mut next = self.current().await;
            let base = next.generation;
            let value = change(&mut next)?;

            let mut root = self.root.write().await;
            if root.generation == base {
                next.generation = base + 1;
                *root = next;
                return Ok(value);
            }
            drop(root);
            attempts += 1;
            trace!(attempts, "store write raced another publish, recomputing");
        }
    }
}

#[async_trait]
impl DesiredStateStore for InMemoryStore {
    async fn create_cluster(&self, cluster: Cluster) -> Result<Cluster> {
        self.commit(|tables| {
            if tables.clusters.contains_key(&cluster.id) {
                return Err(Error::conflict(
                    ResourceKind::Cluster,
                    cluster.id.to_string(),
                    "a cluster with this id already exists",
                ));
            }
            tables.write_cluster(cluster.clone(), 0)
        })
        .await
    }

    async fn get_cluster(&self, id: ClusterId) -> Result<Cluster> {
        self.root.read().await.cluster(id).cloned()
    }

    async fn list_clusters(&self) -> Result<Vec<Cluster>> {
        let tables = self.current().await;
        Ok(tables
            .clusters
            .values()
            .filter(|c| !c.meta.is_deleted())
            .cloned()
            .collect())
    }

    async fn mark_cluster_desired(
        &self,
        id: ClusterId,
        desired: ClusterDesiredState,
    ) -> Result<Cluster> {
        self.commit(|tables| {
            let mut cluster = tables.cluster(id)?.clone();
            ensure_live(ResourceKind::Cluster, &id.to_string(), cluster.meta.is_deleted())?;
            let expected = cluster.meta.resource_version;
            if cluster.desired != desired {
                cluster.desired = desired;
                cluster.meta.mark_desired_changed(Utc::now());
            }
            tables.write_cluster(cluster, expected)
        })
        .await
    }

    async fn replace_cluster(&self, cluster: Cluster, expected_version: u64) -> Result<Cluster> {
        self.commit(|tables| {
            let stored = tables.cluster(cluster.id)?;
            check_version(
                ResourceKind::Cluster,
                &cluster.id.to_string(),
                expected_version,
                stored.meta.resource_version,
            )?;
            tables.write_cluster(cluster.clone(), expected_version)
        })
        .await
    }

    async fn create_namespace(&self, namespace: Namespace) -> Result<Namespace> {
        self.commit(|tables| {
            if tables.namespaces.contains_key(&namespace.id) {
                return Err(Error::conflict(
                    ResourceKind::Namespace,
                    namespace.id.to_string(),
                    "a namespace with this id already exists",
                ));
            }
            tables.ensure_namespace_key_free(&namespace)?;
            tables.write_namespace(namespace.clone(), 0)
        })
        .await
    }

    async fn get_namespace(&self, id: NamespaceId) -> Result<Namespace> {
        self.root.read().await.namespace(id).cloned()
    }

    async fn list_namespaces(&self, cluster_id: Option<ClusterId>) -> Result<Vec<Namespace>> {
        let tables = self.current().await;
        Ok(tables
            .namespaces
            .values()
            .filter(|n| !n.meta.is_deleted())
            .filter(|n| cluster_id.is_none_or(|id| n.cluster_id == id))
            .cloned()
            .collect())
    }

    async fn update_namespace(
        &self,
        id: NamespaceId,
        patch: &NamespacePatch,
        expected_version: u64,
    ) -> Result<Namespace> {
        self.commit(|tables| {
            let mut namespace = tables.namespace(id)?.clone();
            check_version(
                ResourceKind::Namespace,
                &id.to_string(),
                expected_version,
                namespace.meta.resource_version,
            )?;
            ensure_live(ResourceKind::Namespace, &id.to_string(), namespace.meta.is_deleted())?;
            patch.apply_to(&mut namespace)?;
            tables.ensure_namespace_key_free(&namespace)?;
            tables.write_namespace(namespace, expected_version)
        })
        .await
    }

    async fn replace_namespace(
        &self,
        namespace: Namespace,
        expected_version: u64,
    ) -> Result<Namespace> {
        self.commit(|tables| {
            let stored = tables.namespace(namespace.id)?;
            check_version(
                ResourceKind::Namespace,
                &namespace.id.to_string(),
                expected_version,
                stored.meta.resource_version,
            )?;
            tables.ensure_namespace_key_free(&namespace)?;
            tables.write_namespace(namespace.clone(), expected_version)
        })
        .await
    }

    async fn create_connector(&self, connector: Connector) -> Result<Connector> {
        self.commit(|tables| {
            if tables.connectors.contains_key(&connector.id) {
                return Err(Error::conflict(
                    ResourceKind::Connector,
                    connector.id.to_string(),
                    "a connector with this id already exists",
                ));
            }
            tables.ensure_connector_key_free(&connector)?;
            tables.write_connector(connector.clone(), 0)
        })
        .await
    }

    async fn get_connector(&self, id: ConnectorId) -> Result<Connector> {
        self.root.read().await.connector(id).cloned()
    }

    async fn list_connectors(&self, namespace_id: Option<NamespaceId>) -> Result<Vec<Connector>> {
        let tables = self.current().await;
        Ok(tables
            .connectors
            .values()
            .filter(|c| !c.meta.is_deleted())
            .filter(|c| namespace_id.is_none_or(|id| c.namespace_id == id))
            .cloned()
            .collect())
    }

    async fn update_connector(
        &self,
        id: ConnectorId,
        patch: &ConnectorPatch,
        expected_version: u64,
    ) -> Result<Connector> {
        self.commit(|tables| {
            let mut connector = tables.connector(id)?.clone();
            check_version(
                ResourceKind::Connector,
                &id.to_string(),
                expected_version,
                connector.meta.resource_version,
            )?;
            ensure_live(ResourceKind::Connector, &id.to_string(), connector.meta.is_deleted())?;
            patch.apply_to(&mut connector, Utc::now())?;
            tables.ensure_connector_key_free(&connector)?;
            tables.write_connector(connector, expected_version)
        })
        .await
    }

    async fn mark_connector_desired(
        &self,
        id: ConnectorId,
        desired: ConnectorDesiredState,
    ) -> Result<Connector> {
        self.commit(|tables| {
            let mut connector = tables.connector(id)?.clone();
            ensure_live(ResourceKind::Connector, &id.to_string(), connector.meta.is_deleted())?;
            let expected = connector.meta.resource_version;
            if connector.desired != desired {
                connector.desired = desired;
                connector.meta.mark_desired_changed(Utc::now());
            }
            tables.write_connector(connector, expected)
        })
        .await
    }

    async fn replace_connector(
        &self,
        connector: Connector,
        expected_version: u64,
    ) -> Result<Connector> {
        self.commit(|tables| {
            let stored = tables.connector(connector.id)?;
            check_version(
                ResourceKind::Connector,
                &connector.id.to_string(),
                expected_version,
                stored.meta.resource_version,
            )?;
            tables.ensure_connector_key_free(&connector)?;
            tables.write_connector(connector.clone(), expected_version)
        })
        .await
    }

    async fn assign_connector(
        &self,
        connector: Connector,
        expected_version: u64,
        max_per_namespace: usize,
    ) -> Result<Connector> {
        self.commit(|tables| {
            let stored = tables.connector(connector.id)?;
            check_version(
                ResourceKind::Connector,
                &connector.id.to_string(),
                expected_version,
                stored.meta.resource_version,
            )?;
            let current = tables.assigned_in(connector.namespace_id, Some(connector.id));
            if current >= max_per_namespace {
                return Err(Error::capacity_exceeded(
                    connector.namespace_id.to_string(),
                    current,
                    max_per_namespace,
                ));
            }
            tables.ensure_connector_key_free(&connector)?;
            tables.write_connector(connector.clone(), expected_version)
        })
        .await
    }

    async fn connector_count(&self, namespace_id: NamespaceId) -> Result<usize> {
        Ok(self.root.read().await.assigned_in(namespace_id, None))
    }

    async fn put_connector_type(&self, connector_type: ConnectorType) -> Result<ConnectorType> {
        self.commit(|tables| {
            tables
                .connector_types
                .insert(connector_type.id.clone(), connector_type.clone());
            Ok(connector_type.clone())
        })
        .await
    }

    async fn get_connector_type(&self, id: &ConnectorTypeId) -> Result<ConnectorType> {
        self.root
            .read()
            .await
            .connector_types
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found(ResourceKind::ConnectorType, id.to_string()))
    }

    async fn list_connector_types(&self) -> Result<Vec<ConnectorType>> {
        let tables = self.current().await;
        Ok(tables.connector_types.values().cloned().collect())
    }

    async fn snapshot(&self) -> Result<StoreSnapshot> {
        let tables = self.current().await;
        Ok(StoreSnapshot::new(
            tables.clusters,
            tables.namespaces,
            tables.connectors,
            Utc::now(),
        ))
    }
}
