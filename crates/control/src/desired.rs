//! User-facing desired-state writes.

use std::sync::Arc;

use chrono::Utc;
use fleet_core::{
    ClusterId, ConnectorId, ConnectorTypeId, Error, NamespaceId, ResourceKind, Result,
};
use fleet_model::{
    Cluster, ClusterDesiredState, ClusterSpec, Connector, ConnectorDesiredState, ConnectorPatch,
    ConnectorSpec, ConnectorType, Namespace, NamespacePatch, NamespaceSpec, Reconcilable,
};
use fleet_store::DesiredStateStore;
use tracing::{debug, info};

use crate::assignment::NamespaceResolver;
use crate::trigger::ReconcileTrigger;

/// Validates and records what users ask for, then wakes the reconciler.
pub struct DesiredStateService {
    store: Arc<dyn DesiredStateStore>,
    resolver: Arc<NamespaceResolver>,
    trigger: ReconcileTrigger,
}

impl DesiredStateService {
    pub fn new(
        store: Arc<dyn DesiredStateStore>,
        resolver: Arc<NamespaceResolver>,
        trigger: ReconcileTrigger,
    ) -> Self {
        Self {
            store,
            resolver,
            trigger,
        }
    }

    pub fn store(&self) -> &Arc<dyn DesiredStateStore> {
        &self.store
    }

    // Clusters

    pub async fn create_cluster(&self, spec: ClusterSpec) -> Result<Cluster> {
        let cluster = self.store.create_cluster(Cluster::new(spec, Utc::now())?).await?;
        info!(cluster_id = %cluster.id, status = %cluster.status, "cluster created");
        self.trigger.notify();
        Ok(cluster)
    }

    pub async fn get_cluster(&self, id: ClusterId) -> Result<Cluster> {
        self.store.get_cluster(id).await
    }

    pub async fn list_clusters(&self) -> Result<Vec<Cluster>> {
        self.store.list_clusters().await
    }

    /// Ask for the cluster to be torn down.
    ///
    /// A failed cluster has nothing left to deprovision and is soft-deleted
    /// on the spot.
    pub async fn delete_cluster(&self, id: ClusterId) -> Result<Cluster> {
        let cluster = self.store.get_cluster(id).await?;
        if cluster.meta.is_deleted() {
            return Ok(cluster);
        }
        self.ensure_no_namespaces(id).await?;

        let deleted = if cluster.is_failed() {
            let mut next = cluster.clone();
            next.request_delete(Utc::now())?;
            self.store.replace_cluster(next, cluster.version()).await?
        } else {
            self.store
                .mark_cluster_desired(id, ClusterDesiredState::Deleted)
                .await?
        };

        // A namespace that landed between the check and the mark wins.
        if let Err(error) = self.ensure_no_namespaces(id).await {
            if deleted.meta.is_deleted() {
                self.store.replace_cluster(cluster, deleted.version()).await?;
            } else {
                self.store.mark_cluster_desired(id, cluster.desired).await?;
            }
            debug!(cluster_id = %id, "cluster delete withdrawn, namespace created meanwhile");
            return Err(error);
        }

        info!(
            cluster_id = %id,
            soft_deleted = deleted.meta.is_deleted(),
            "cluster delete requested"
        );
        self.trigger.notify();
        Ok(deleted)
    }

    async fn ensure_no_namespaces(&self, id: ClusterId) -> Result<()> {
        if self.store.list_namespaces(Some(id)).await?.is_empty() {
            Ok(())
        } else {
            Err(Error::conflict(
                ResourceKind::Cluster,
                id.to_string(),
                "cluster still has namespaces",
            ))
        }
    }

    // Namespaces

    pub async fn create_namespace(&self, spec: NamespaceSpec) -> Result<Namespace> {
        let cluster = self.store.get_cluster(spec.cluster_id).await?;
        if cluster.meta.is_deleted() {
            return Err(Error::not_found(ResourceKind::Cluster, cluster.id.to_string()));
        }
        if cluster.desired == ClusterDesiredState::Deleted {
            return Err(Error::conflict(
                ResourceKind::Cluster,
                cluster.id.to_string(),
                "cluster is being deleted",
            ));
        }

        let namespace = self
            .store
            .create_namespace(Namespace::new(spec, Utc::now())?)
            .await?;

        // The cluster may have been marked for deletion after the check above.
        let cluster = self.store.get_cluster(namespace.cluster_id).await?;
        if cluster.meta.is_deleted() || cluster.desired == ClusterDesiredState::Deleted {
            let mut withdrawn = namespace.clone();
            withdrawn.meta.soft_delete(Utc::now());
            self.store
                .replace_namespace(withdrawn, namespace.meta.resource_version)
                .await?;
            return Err(Error::conflict(
                ResourceKind::Cluster,
                cluster.id.to_string(),
                "cluster is being deleted",
            ));
        }
        info!(
            namespace_id = %namespace.id,
            cluster_id = %namespace.cluster_id,
            name = %namespace.name,
            "namespace created"
        );
        self.trigger.notify();
        Ok(namespace)
    }

    pub async fn get_namespace(&self, id: NamespaceId) -> Result<Namespace> {
        self.store.get_namespace(id).await
    }

    pub async fn list_namespaces(&self, cluster_id: Option<ClusterId>) -> Result<Vec<Namespace>> {
        self.store.list_namespaces(cluster_id).await
    }

    pub async fn patch_namespace(
        &self,
        id: NamespaceId,
        patch: &NamespacePatch,
        expected_version: u64,
    ) -> Result<Namespace> {
        let namespace = self.store.update_namespace(id, patch, expected_version).await?;
        self.trigger.notify();
        Ok(namespace)
    }

    pub async fn delete_namespace(&self, id: NamespaceId) -> Result<Namespace> {
        let namespace = self.store.get_namespace(id).await?;
        if namespace.meta.is_deleted() {
            return Ok(namespace);
        }
        if !self.store.list_connectors(Some(id)).await?.is_empty() {
            return Err(Error::conflict(
                ResourceKind::Namespace,
                id.to_string(),
                "namespace still has connectors",
            ));
        }

        let expected = namespace.meta.resource_version;
        let mut next = namespace;
        next.meta.soft_delete(Utc::now());
        let deleted = self.store.replace_namespace(next, expected).await?;
        info!(namespace_id = %id, "namespace deleted");
        self.trigger.notify();
        Ok(deleted)
    }

    // Catalog

    /// Load catalog entries, replacing any with the same id.
    pub async fn load_catalog(&self, types: Vec<ConnectorType>) -> Result<usize> {
        let count = types.len();
        types.iter().try_for_each(ConnectorType::check_schema)?;
        for connector_type in types {
            self.store.put_connector_type(connector_type).await?;
        }
        info!(count, "connector catalog loaded");
        Ok(count)
    }

    pub async fn get_connector_type(&self, id: &ConnectorTypeId) -> Result<ConnectorType> {
        self.store.get_connector_type(id).await
    }

    pub async fn list_connector_types(&self) -> Result<Vec<ConnectorType>> {
        self.store.list_connector_types().await
    }

    // Connectors

    /// Validate and store a connector, then try to place it right away.
    ///
    /// Placement preconditions that are not met yet do not fail the
    /// request; the reconciler keeps trying.
    pub async fn create_connector(&self, spec: ConnectorSpec) -> Result<Connector> {
        let connector_type = self.connector_type_for(&spec.connector_type_id).await?;
        connector_type.admit(spec.channel, &spec.connector)?;

        let namespace = self.store.get_namespace(spec.namespace_id).await?;
        if namespace.meta.is_deleted() {
            return Err(Error::not_found(ResourceKind::Namespace, namespace.id.to_string()));
        }

        let created = self
            .store
            .create_connector(Connector::new(spec, Utc::now())?)
            .await?;
        info!(
            connector_id = %created.id,
            namespace_id = %created.namespace_id,
            connector_type_id = %created.connector_type_id,
            "connector created"
        );

        let connector = match self.resolver.assign_from(created.clone(), namespace.id).await {
            Ok(Some(assigned)) => assigned,
            Ok(None) => created,
            Err(error) if error.is_recoverable() => {
                debug!(
                    connector_id = %created.id,
                    code = error.code(),
                    %error,
                    "assignment deferred"
                );
                created
            }
            Err(error) => return Err(error),
        };

        self.trigger.notify();
        Ok(connector)
    }

    pub async fn get_connector(&self, id: ConnectorId) -> Result<Connector> {
        self.store.get_connector(id).await
    }

    pub async fn list_connectors(
        &self,
        namespace_id: Option<NamespaceId>,
    ) -> Result<Vec<Connector>> {
        self.store.list_connectors(namespace_id).await
    }

    /// Apply a user patch guarded by `expected_version`.
    ///
    /// A new configuration payload is checked against the type's schema
    /// before anything is written.
    pub async fn patch_connector(
        &self,
        id: ConnectorId,
        patch: &ConnectorPatch,
        expected_version: u64,
    ) -> Result<Connector> {
        if let Some(configuration) = &patch.connector {
            let current = self.store.get_connector(id).await?;
            self.connector_type_for(&current.connector_type_id)
                .await?
                .check_configuration(configuration)?;
        }

        let connector = self.store.update_connector(id, patch, expected_version).await?;
        info!(
            connector_id = %id,
            resource_version = connector.meta.resource_version,
            "connector patched"
        );
        self.trigger.notify();
        Ok(connector)
    }

    pub async fn set_connector_desired(
        &self,
        id: ConnectorId,
        desired: ConnectorDesiredState,
    ) -> Result<Connector> {
        let connector = self.store.mark_connector_desired(id, desired).await?;
        info!(connector_id = %id, desired = %desired, "connector desired state set");
        self.trigger.notify();
        Ok(connector)
    }

    pub async fn delete_connector(&self, id: ConnectorId) -> Result<Connector> {
        self.set_connector_desired(id, ConnectorDesiredState::Deleted).await
    }

    /// Re-place a failed connector.
    pub async fn retry_connector(&self, id: ConnectorId) -> Result<Connector> {
        let connector = self.resolver.retry(id).await?;
        self.trigger.notify();
        Ok(connector)
    }

    async fn connector_type_for(&self, id: &ConnectorTypeId) -> Result<ConnectorType> {
        match self.store.get_connector_type(id).await {
            Err(Error::NotFound { .. }) => Err(Error::invalid_configuration(format!(
                "/connector_type_id: unknown connector type '{id}'"
            ))),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use fleet_model::{ClusterStatus, ConnectorState};
    use fleet_store::InMemoryStore;
    use serde_json::json;

    use super::*;

    fn service(store: Arc<InMemoryStore>) -> DesiredStateService {
        let resolver = Arc::new(NamespaceResolver::new(store.clone(), 4));
        DesiredStateService::new(store, resolver, ReconcileTrigger::new())
    }

    fn log_sink() -> ConnectorType {
        ConnectorType::new("log_sink_0.1", "Log sink", "0.1").with_schema(json!({
            "type": "object",
            "required": ["topic"],
            "properties": {"topic": {"type": "string", "minLength": 1}}
        }))
    }

    async fn setup(status: ClusterStatus) -> (DesiredStateService, Cluster, Namespace) {
        let svc = service(InMemoryStore::new_arc());
        svc.load_catalog(vec![log_sink()]).await.unwrap();
        let cluster = svc
            .create_cluster(ClusterSpec::new("aws", "us-east-1").with_status(status))
            .await
            .unwrap();
        let namespace = svc
            .create_namespace(NamespaceSpec::new(cluster.id, "team-a"))
            .await
            .unwrap();
        (svc, cluster, namespace)
    }

    fn sink_spec(namespace_id: NamespaceId) -> ConnectorSpec {
        ConnectorSpec::new("orders", "log_sink_0.1", namespace_id, "kafka:9092")
            .with_configuration(json!({"topic": "orders"}))
    }

    #[tokio::test]
    async fn test_create_connector_assigns_on_ready_cluster() {
        let (svc, cluster, namespace) = setup(ClusterStatus::Ready).await;

        let connector = svc.create_connector(sink_spec(namespace.id)).await.unwrap();

        assert_eq!(connector.cluster_id, Some(cluster.id));
        assert_eq!(connector.actual, Some(ConnectorState::Assigning));
    }

    #[tokio::test]
    async fn test_create_connector_defers_on_unready_cluster() {
        let (svc, _, namespace) = setup(ClusterStatus::Provisioning).await;

        let connector = svc.create_connector(sink_spec(namespace.id)).await.unwrap();

        assert_eq!(connector.cluster_id, None);
        assert_eq!(connector.actual, None);
        assert_eq!(connector.meta.resource_version, 1);
    }

    #[tokio::test]
    async fn test_schema_violations_are_never_stored() {
        let (svc, _, namespace) = setup(ClusterStatus::Ready).await;
        let spec = sink_spec(namespace.id).with_configuration(json!({"topic": ""}));

        let error = svc.create_connector(spec).await.unwrap_err();

        assert!(matches!(error, Error::InvalidConfiguration { .. }));
        assert!(svc.list_connectors(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_connector_type_is_invalid_configuration() {
        let (svc, _, namespace) = setup(ClusterStatus::Ready).await;
        let spec = ConnectorSpec::new("orders", "missing_type", namespace.id, "kafka:9092");

        let error = svc.create_connector(spec).await.unwrap_err();
        assert_eq!(error.code(), "invalid_configuration");
    }

    #[tokio::test]
    async fn test_patch_revalidates_configuration() {
        let (svc, _, namespace) = setup(ClusterStatus::Ready).await;
        let connector = svc.create_connector(sink_spec(namespace.id)).await.unwrap();

        let bad = ConnectorPatch {
            connector: Some(json!({"topic": 7})),
            ..ConnectorPatch::default()
        };
        let error = svc
            .patch_connector(connector.id, &bad, connector.meta.resource_version)
            .await
            .unwrap_err();
        assert_eq!(error.code(), "invalid_configuration");

        let good = ConnectorPatch {
            connector: Some(json!({"topic": "payments"})),
            ..ConnectorPatch::default()
        };
        let patched = svc
            .patch_connector(connector.id, &good, connector.meta.resource_version)
            .await
            .unwrap();
        assert_eq!(patched.connector, json!({"topic": "payments"}));
    }

    #[tokio::test]
    async fn test_delete_cluster_refused_while_namespaces_remain() {
        let (svc, cluster, namespace) = setup(ClusterStatus::Ready).await;

        let error = svc.delete_cluster(cluster.id).await.unwrap_err();
        assert_eq!(error.code(), "conflict");

        svc.delete_namespace(namespace.id).await.unwrap();
        let deleted = svc.delete_cluster(cluster.id).await.unwrap();
        assert_eq!(deleted.desired, ClusterDesiredState::Deleted);
        assert!(!deleted.meta.is_deleted());
    }

    #[tokio::test]
    async fn test_delete_failed_cluster_soft_deletes() {
        let svc = service(InMemoryStore::new_arc());
        let cluster = svc
            .create_cluster(ClusterSpec::new("aws", "us-east-1"))
            .await
            .unwrap();
        let mut failed = cluster.clone();
        failed.status = ClusterStatus::Failed;
        svc.store().replace_cluster(failed, 1).await.unwrap();

        let deleted = svc.delete_cluster(cluster.id).await.unwrap();
        assert!(deleted.meta.is_deleted());
    }

    #[tokio::test]
    async fn test_delete_namespace_refused_while_connectors_remain() {
        let (svc, _, namespace) = setup(ClusterStatus::Ready).await;
        svc.create_connector(sink_spec(namespace.id)).await.unwrap();

        let error = svc.delete_namespace(namespace.id).await.unwrap_err();
        assert_eq!(error.code(), "conflict");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_cluster_delete_and_namespace_create_leave_no_orphan() {
        let svc = Arc::new(service(InMemoryStore::new_arc()));

        for round in 0..150 {
            let cluster = svc
                .create_cluster(
                    ClusterSpec::new("aws", "us-east-1").with_status(ClusterStatus::Ready),
                )
                .await
                .unwrap();
            let deleter = tokio::spawn({
                let svc = svc.clone();
                async move { svc.delete_cluster(cluster.id).await }
            });
            let creator = tokio::spawn({
                let svc = svc.clone();
                let spec = NamespaceSpec::new(cluster.id, format!("team-{round}"));
                async move { svc.create_namespace(spec).await }
            });
            let deleted = deleter.await.unwrap();
            let created = creator.await.unwrap();
            assert!(deleted.is_err() || created.is_err(), "round {round}: both calls won");

            let stored = svc.store().get_cluster(cluster.id).await.unwrap();
            let deleting =
                stored.meta.is_deleted() || stored.desired == ClusterDesiredState::Deleted;
            let live = svc.store().list_namespaces(Some(cluster.id)).await.unwrap();
            assert!(
                !(deleting && !live.is_empty()),
                "round {round}: deleting cluster kept {} namespace(s)",
                live.len()
            );
        }
    }

    #[tokio::test]
    async fn test_namespace_on_deleting_cluster_conflicts() {
        let svc = service(InMemoryStore::new_arc());
        let cluster = svc
            .create_cluster(ClusterSpec::new("aws", "us-east-1"))
            .await
            .unwrap();
        svc.delete_cluster(cluster.id).await.unwrap();

        let error = svc
            .create_namespace(NamespaceSpec::new(cluster.id, "late"))
            .await
            .unwrap_err();
        assert_eq!(error.code(), "conflict");
    }

    #[tokio::test]
    async fn test_writes_fire_trigger() {
        let (svc, _, _) = setup(ClusterStatus::Ready).await;
        let woke = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            svc.trigger.notified(),
        )
        .await;
        assert!(woke.is_ok());
    }
}
