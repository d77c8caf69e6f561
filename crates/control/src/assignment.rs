//! Namespace/assignment resolver.
//!
//! Places a connector into a namespace and, through it, onto the
//! namespace's cluster. Every placement is a compare-and-swap on the
//! connector row combined with the namespace capacity check.

use std::sync::Arc;

use chrono::Utc;
use fleet_core::{ConnectorId, Error, NamespaceId, ResourceKind, Result};
use fleet_model::{
    ClusterDesiredState, Connector, ConnectorDesiredState, ConnectorEvent, ConnectorState,
    PendingAction, Reconcilable,
};
use fleet_store::DesiredStateStore;
use tracing::{debug, info};

/// Re-read attempts after losing a placement race.
const MAX_ASSIGN_RETRIES: usize = 3;

pub struct NamespaceResolver {
    store: Arc<dyn DesiredStateStore>,
    max_connectors_per_namespace: usize,
}

impl NamespaceResolver {
    pub fn new(store: Arc<dyn DesiredStateStore>, max_connectors_per_namespace: usize) -> Self {
        Self {
            store,
            max_connectors_per_namespace,
        }
    }

    pub const fn max_connectors_per_namespace(&self) -> usize {
        self.max_connectors_per_namespace
    }

    /// Assign `connector_id` to `namespace_id`.
    ///
    /// Re-assigning to the current namespace returns the row unchanged.
    pub async fn assign(
        &self,
        connector_id: ConnectorId,
        namespace_id: NamespaceId,
    ) -> Result<Connector> {
        let mut retries = 0;
        loop {
            let connector = self.store.get_connector(connector_id).await?;
            match self.assign_from(connector.clone(), namespace_id).await {
                Ok(Some(assigned)) => return Ok(assigned),
                Ok(None) => return Ok(connector),
                Err(Error::VersionMismatch { .. }) if retries < MAX_ASSIGN_RETRIES => {
                    retries += 1;
                    debug!(connector_id = %connector_id, retries, "assignment raced, re-reading");
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// One placement attempt against an already loaded row.
    ///
    /// `Ok(None)` means nothing had to change. A concurrent writer surfaces
    /// as `VersionMismatch`; the caller decides whether to retry.
    pub async fn assign_from(
        &self,
        connector: Connector,
        namespace_id: NamespaceId,
    ) -> Result<Option<Connector>> {
        if connector.meta.is_deleted() {
            return Err(Error::not_found(ResourceKind::Connector, connector.id.to_string()));
        }
        if connector.is_assigned() && connector.namespace_id == namespace_id {
            return Ok(None);
        }
        if connector.is_assigned() && !connector.is_failed() {
            return Err(Error::conflict(
                ResourceKind::Connector,
                connector.id.to_string(),
                format!(
                    "connector is assigned to namespace '{}'; only failed connectors can move",
                    connector.namespace_id
                ),
            ));
        }
        self.place(connector, namespace_id, ConnectorEvent::Assigned)
            .await
            .map(Some)
    }

    /// Re-place a failed connector in its namespace.
    pub async fn retry(&self, connector_id: ConnectorId) -> Result<Connector> {
        let mut retries = 0;
        loop {
            let connector = self.store.get_connector(connector_id).await?;
            if connector.meta.is_deleted() {
                return Err(Error::not_found(ResourceKind::Connector, connector_id.to_string()));
            }
            ConnectorState::transition(connector.actual, ConnectorEvent::Retry)?;

            let namespace_id = connector.namespace_id;
            match self.place(connector, namespace_id, ConnectorEvent::Retry).await {
                Err(Error::VersionMismatch { .. }) if retries < MAX_ASSIGN_RETRIES => {
                    retries += 1;
                    debug!(connector_id = %connector_id, retries, "retry raced, re-reading");
                }
                result => return result,
            }
        }
    }

    async fn place(
        &self,
        connector: Connector,
        namespace_id: NamespaceId,
        event: ConnectorEvent,
    ) -> Result<Connector> {
        if connector.desired == ConnectorDesiredState::Deleted {
            return Err(Error::conflict(
                ResourceKind::Connector,
                connector.id.to_string(),
                "connector is being deleted",
            ));
        }

        let namespace = self.store.get_namespace(namespace_id).await?;
        if namespace.meta.is_deleted() {
            return Err(Error::not_found(ResourceKind::Namespace, namespace_id.to_string()));
        }

        let cluster = self.store.get_cluster(namespace.cluster_id).await?;
        if !cluster.accepts_connectors() {
            let deleting =
                cluster.desired == ClusterDesiredState::Deleted || cluster.meta.is_deleted();
            let status = if deleting {
                "deleting".to_string()
            } else {
                cluster.status.to_string()
            };
            return Err(Error::cluster_not_ready(cluster.id.to_string(), status));
        }

        let now = Utc::now();
        let expected = connector.version();
        let mut next = connector;
        if next.cluster_id != Some(cluster.id) {
            // Report versions are per agent; the new one counts from zero.
            next.meta.reported_version = 0;
        }
        next.namespace_id = namespace_id;
        next.cluster_id = Some(cluster.id);
        next.apply_transition(event, now)?;
        next.meta.claim(PendingAction::Assign, now);
        next.meta.failure_reason = None;

        let assigned = self
            .store
            .assign_connector(next, expected, self.max_connectors_per_namespace)
            .await?;

        info!(
            connector_id = %assigned.id,
            namespace_id = %namespace_id,
            cluster_id = %cluster.id,
            resource_version = assigned.meta.resource_version,
            "connector assigned"
        );
        Ok(assigned)
    }
}
