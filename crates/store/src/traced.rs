//! Store decorator that logs every write.

use std::sync::Arc;

use async_trait::async_trait;
use fleet_core::{ClusterId, ConnectorId, ConnectorTypeId, NamespaceId, Result};
use fleet_model::{
    Cluster, ClusterDesiredState, Connector, ConnectorDesiredState, ConnectorPatch,
    ConnectorType, Namespace, NamespacePatch,
};
use tracing::{debug, warn};

use crate::snapshot::StoreSnapshot;
use crate::store::DesiredStateStore;

/// Wraps another store and emits a tracing event per write.
///
/// Version mismatches are logged at debug: they are expected under
/// concurrent writers and callers retry or drop them.
#[derive(Clone)]
pub struct TracingStore {
    inner: Arc<dyn DesiredStateStore>,
}

impl TracingStore {
    pub fn new(inner: Arc<dyn DesiredStateStore>) -> Self {
        Self { inner }
    }
}

fn log_write<T>(
    operation: &'static str,
    id: &str,
    result: &Result<T>,
    version: impl Fn(&T) -> u64,
) {
    match result {
        Ok(row) => debug!(operation, id, resource_version = version(row), "store write committed"),
        Err(error) if error.is_recoverable() => {
            debug!(operation, id, code = error.code(), %error, "store write refused");
        }
        Err(error) => warn!(operation, id, code = error.code(), %error, "store write failed"),
    }
}

#[async_trait]
impl DesiredStateStore for TracingStore {
    async fn create_cluster(&self, cluster: Cluster) -> Result<Cluster> {
        let id = cluster.id.to_string();
        let result = self.inner.create_cluster(cluster).await;
        log_write("create_cluster", &id, &result, |c| c.meta.resource_version);
        result
    }

    async fn get_cluster(&self, id: ClusterId) -> Result<Cluster> {
        self.inner.get_cluster(id).await
    }

    async fn list_clusters(&self) -> Result<Vec<Cluster>> {
        self.inner.list_clusters().await
    }

    async fn mark_cluster_desired(
        &self,
        id: ClusterId,
        desired: ClusterDesiredState,
    ) -> Result<Cluster> {
        let result = self.inner.mark_cluster_desired(id, desired).await;
        log_write("mark_cluster_desired", &id.to_string(), &result, |c| {
            c.meta.resource_version
        });
        result
    }

    async fn replace_cluster(&self, cluster: Cluster, expected_version: u64) -> Result<Cluster> {
        let id = cluster.id.to_string();
        let result = self.inner.replace_cluster(cluster, expected_version).await;
        log_write("replace_cluster", &id, &result, |c| c.meta.resource_version);
        result
    }

    async fn create_namespace(&self, namespace: Namespace) -> Result<Namespace> {
        let id = namespace.id.to_string();
        let result = self.inner.create_namespace(namespace).await;
        log_write("create_namespace", &id, &result, |n| n.meta.resource_version);
        result
    }

    async fn get_namespace(&self, id: NamespaceId) -> Result<Namespace> {
        self.inner.get_namespace(id).await
    }

    async fn list_namespaces(&self, cluster_id: Option<ClusterId>) -> Result<Vec<Namespace>> {
        self.inner.list_namespaces(cluster_id).await
    }

    async fn update_namespace(
        &self,
        id: NamespaceId,
        patch: &NamespacePatch,
        expected_version: u64,
    ) -> Result<Namespace> {
        let result = self.inner.update_namespace(id, patch, expected_version).await;
        log_write("update_namespace", &id.to_string(), &result, |n| {
            n.meta.resource_version
        });
        result
    }

    async fn replace_namespace(
        &self,
        namespace: Namespace,
        expected_version: u64,
    ) -> Result<Namespace> {
        let id = namespace.id.to_string();
        let result = self.inner.replace_namespace(namespace, expected_version).await;
        log_write("replace_namespace", &id, &result, |n| n.meta.resource_version);
        result
    }

    async fn create_connector(&self, connector: Connector) -> Result<Connector> {
        let id = connector.id.to_string();
        let result = self.inner.create_connector(connector).await;
        log_write("create_connector", &id, &result, |c| c.meta.resource_version);
        result
    }

    async fn get_connector(&self, id: ConnectorId) -> Result<Connector> {
        self.inner.get_connector(id).await
    }

    async fn list_connectors(&self, namespace_id: Option<NamespaceId>) -> Result<Vec<Connector>> {
        self.inner.list_connectors(namespace_id).await
    }

    async fn update_connector(
        &self,
        id: ConnectorId,
        patch: &ConnectorPatch,
        expected_version: u64,
    ) -> Result<Connector> {
        let result = self.inner.update_connector(id, patch, expected_version).await;
        log_write("update_connector", &id.to_string(), &result, |c| {
            c.meta.resource_version
        });
        result
    }

    async fn mark_connector_desired(
        &self,
        id: ConnectorId,
        desired: ConnectorDesiredState,
    ) -> Result<Connector> {
        let result = self.inner.mark_connector_desired(id, desired).await;
        log_write("mark_connector_desired", &id.to_string(), &result, |c| {
            c.meta.resource_version
        });
        result
    }

    async fn replace_connector(
        &self,
        connector: Connector,
        expected_version: u64,
    ) -> Result<Connector> {
        let id = connector.id.to_string();
        let result = self.inner.replace_connector(connector, expected_version).await;
        log_write("replace_connector", &id, &result, |c| c.meta.resource_version);
        result
    }

    async fn assign_connector(
        &self,
        connector: Connector,
        expected_version: u64,
        max_per_namespace: usize,
    ) -> Result<Connector> {
        let id = connector.id.to_string();
        let result = self
            .inner
            .assign_connector(connector, expected_version, max_per_namespace)
            .await;
        log_write("assign_connector", &id, &result, |c| c.meta.resource_version);
        result
    }

    async fn connector_count(&self, namespace_id: NamespaceId) -> Result<usize> {
        self.inner.connector_count(namespace_id).await
    }

    async fn put_connector_type(&self, connector_type: ConnectorType) -> Result<ConnectorType> {
        let id = connector_type.id.to_string();
        let result = self.inner.put_connector_type(connector_type).await;
        log_write("put_connector_type", &id, &result, |_| 1);
        result
    }

    async fn get_connector_type(&self, id: &ConnectorTypeId) -> Result<ConnectorType> {
        self.inner.get_connector_type(id).await
    }

    async fn list_connector_types(&self) -> Result<Vec<ConnectorType>> {
        self.inner.list_connector_types().await
    }

    async fn snapshot(&self) -> Result<StoreSnapshot> {
        self.inner.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::Utc;
    use fleet_model::ClusterSpec;

    use super::*;
    use crate::memory::InMemoryStore;

    #[tokio::test]
    async fn test_delegates_to_inner_store() {
        let inner = InMemoryStore::new_arc();
        let store = TracingStore::new(inner.clone());

        let cluster = Cluster::new(ClusterSpec::new("aws", "us-east-1"), Utc::now()).unwrap();
        let created = store.create_cluster(cluster).await.unwrap();

        let seen = inner.get_cluster(created.id).await.unwrap();
        assert_eq!(seen.meta.resource_version, 1);
    }

    #[tokio::test]
    async fn test_errors_pass_through_unchanged() {
        let store = TracingStore::new(InMemoryStore::new_arc());
        let cluster = Cluster::new(ClusterSpec::new("aws", "us-east-1"), Utc::now()).unwrap();
        let created = store.create_cluster(cluster).await.unwrap();

        let error = store.replace_cluster(created, 7).await.unwrap_err();
        assert_eq!(error.code(), "version_mismatch");
    }
}
