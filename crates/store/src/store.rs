//! The Desired-State Store contract.

use async_trait::async_trait;
use fleet_core::{
    ClusterId, ConnectorId, ConnectorTypeId, Error, NamespaceId, ResourceKind, Result,
};
use fleet_model::{
    Cluster, ClusterDesiredState, Connector, ConnectorDesiredState, ConnectorPatch,
    ConnectorType, Namespace, NamespacePatch, Reconcilable,
};

use crate::snapshot::StoreSnapshot;

/// Persistent record of clusters, namespaces, connectors and the catalog.
///
/// Every committed write bumps the row's `resource_version` by exactly one.
/// Conditional writes (`update_*`, `replace_*`, `assign_connector`) only
/// succeed when the stored version equals `expected_version`; otherwise they
/// fail with [`Error::VersionMismatch`] and change nothing.
#[async_trait]
pub trait DesiredStateStore: Send + Sync {
    /// Store a new cluster. `Conflict` if the id is taken.
    async fn create_cluster(&self, cluster: Cluster) -> Result<Cluster>;

    /// Soft-deleted clusters are still returned.
    async fn get_cluster(&self, id: ClusterId) -> Result<Cluster>;

    /// Live clusters, oldest first.
    async fn list_clusters(&self) -> Result<Vec<Cluster>>;

    /// Desired-state-only write; the latest intent wins.
    async fn mark_cluster_desired(
        &self,
        id: ClusterId,
        desired: ClusterDesiredState,
    ) -> Result<Cluster>;

    /// Compare-and-swap a whole cluster row.
    async fn replace_cluster(&self, cluster: Cluster, expected_version: u64) -> Result<Cluster>;

    /// Store a new namespace. `Conflict` if `(cluster_id, name)` is taken.
    async fn create_namespace(&self, namespace: Namespace) -> Result<Namespace>;

    async fn get_namespace(&self, id: NamespaceId) -> Result<Namespace>;

    async fn list_namespaces(&self, cluster_id: Option<ClusterId>) -> Result<Vec<Namespace>>;

    async fn update_namespace(
        &self,
        id: NamespaceId,
        patch: &NamespacePatch,
        expected_version: u64,
    ) -> Result<Namespace>;

    async fn replace_namespace(
        &self,
        namespace: Namespace,
        expected_version: u64,
    ) -> Result<Namespace>;

    /// Store a new connector. `Conflict` if `(namespace_id, name)` is taken.
    async fn create_connector(&self, connector: Connector) -> Result<Connector>;

    async fn get_connector(&self, id: ConnectorId) -> Result<Connector>;

    async fn list_connectors(&self, namespace_id: Option<NamespaceId>) -> Result<Vec<Connector>>;

    async fn update_connector(
        &self,
        id: ConnectorId,
        patch: &ConnectorPatch,
        expected_version: u64,
    ) -> Result<Connector>;

    /// Desired-state-only write; the latest intent wins.
    async fn mark_connector_desired(
        &self,
        id: ConnectorId,
        desired: ConnectorDesiredState,
    ) -> Result<Connector>;

    async fn replace_connector(
        &self,
        connector: Connector,
        expected_version: u64,
    ) -> Result<Connector>;

    /// Compare-and-swap a connector that is being placed in its namespace.
    ///
    /// Fails with `CapacityExceeded` when the namespace already holds
    /// `max_per_namespace` other live, assigned connectors. The count and the
    /// write are atomic.
    async fn assign_connector(
        &self,
        connector: Connector,
        expected_version: u64,
        max_per_namespace: usize,
    ) -> Result<Connector>;

    /// Live connectors currently assigned to a namespace.
    async fn connector_count(&self, namespace_id: NamespaceId) -> Result<usize>;

    /// Insert or replace a catalog entry.
    async fn put_connector_type(&self, connector_type: ConnectorType) -> Result<ConnectorType>;

    async fn get_connector_type(&self, id: &ConnectorTypeId) -> Result<ConnectorType>;

    async fn list_connector_types(&self) -> Result<Vec<ConnectorType>>;

    /// Every cluster, namespace and connector as of one point in time.
    async fn snapshot(&self) -> Result<StoreSnapshot>;
}

/// Compare-and-swap a reconcilable row through the matching store method.
#[async_trait]
pub trait Persist: Reconcilable {
    async fn persist(self, store: &dyn DesiredStateStore, expected_version: u64) -> Result<Self>;
}

#[async_trait]
impl Persist for Cluster {
    async fn persist(self, store: &dyn DesiredStateStore, expected_version: u64) -> Result<Self> {
        store.replace_cluster(self, expected_version).await
    }
}

#[async_trait]
impl Persist for Connector {
    async fn persist(self, store: &dyn DesiredStateStore, expected_version: u64) -> Result<Self> {
        store.replace_connector(self, expected_version).await
    }
}

/// The version a row gets on its next write.
pub(crate) fn next_version(kind: ResourceKind, id: &str, current: u64) -> Result<u64> {
    current.checked_add(1).ok_or_else(|| {
        Error::storage(
            format!("bump {kind} version"),
            format!("{kind} '{id}' resource_version overflowed"),
        )
    })
}

/// Reject a conditional write against a newer row.
pub(crate) fn check_version(
    kind: ResourceKind,
    id: &str,
    expected: u64,
    actual: u64,
) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::version_mismatch(kind, id, expected, actual))
    }
}

/// Reject desired-state writes against soft-deleted rows.
pub(crate) fn ensure_live(kind: ResourceKind, id: &str, deleted: bool) -> Result<()> {
    if deleted {
        Err(Error::conflict(kind, id, "resource is deleted"))
    } else {
        Ok(())
    }
}
