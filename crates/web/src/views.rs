//! Response bodies for the user API.
//!
//! Connector views never carry client secrets; only the agent work
//! listing does.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use fleet_core::{ClusterId, ConnectorId, ConnectorTypeId, NamespaceId};
use fleet_model::{
    Channel, Cluster, ClusterDesiredState, ClusterStatus, Connector, ConnectorDesiredState,
    ConnectorState, Namespace, PendingAction, RowMeta, SchemaRegistryConnectionSettings,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Row bookkeeping shown on every resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowView {
    pub resource_version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl From<&RowMeta> for RowView {
    fn from(meta: &RowMeta) -> Self {
        Self {
            resource_version: meta.resource_version,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            deleted_at: meta.deleted_at,
            pending: meta.pending,
            failure_reason: meta.failure_reason.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterView {
    pub id: ClusterId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub cloud_provider: String,
    pub region: String,
    pub multi_az: bool,
    pub byoc: bool,
    pub managed: bool,
    pub status: ClusterStatus,
    pub desired_state: ClusterDesiredState,
    #[serde(flatten)]
    pub row: RowView,
}

impl From<Cluster> for ClusterView {
    fn from(cluster: Cluster) -> Self {
        Self {
            row: RowView::from(&cluster.meta),
            id: cluster.id,
            external_id: cluster.external_id,
            cloud_provider: cluster.cloud_provider,
            region: cluster.region,
            multi_az: cluster.multi_az,
            byoc: cluster.byoc,
            managed: cluster.managed,
            status: cluster.status,
            desired_state: cluster.desired,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceView {
    pub id: NamespaceId,
    pub name: String,
    pub cluster_id: ClusterId,
    pub annotations: BTreeMap<String, String>,
    #[serde(flatten)]
    pub row: RowView,
}

impl From<Namespace> for NamespaceView {
    fn from(namespace: Namespace) -> Self {
        Self {
            row: RowView::from(&namespace.meta),
            id: namespace.id,
            name: namespace.name,
            cluster_id: namespace.cluster_id,
            annotations: namespace.annotations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KafkaView {
    pub bootstrap_server: String,
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountView {
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorView {
    pub id: ConnectorId,
    pub name: String,
    pub connector_type_id: ConnectorTypeId,
    pub namespace_id: NamespaceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<ClusterId>,
    pub channel: Channel,
    pub desired_state: ConnectorDesiredState,
    /// `None` until the connector is first assigned.
    pub state: Option<ConnectorState>,
    pub kafka: KafkaView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_registry: Option<SchemaRegistryConnectionSettings>,
    pub service_account: ServiceAccountView,
    pub connector: Value,
    #[serde(flatten)]
    pub row: RowView,
}

impl From<Connector> for ConnectorView {
    fn from(connector: Connector) -> Self {
        Self {
            row: RowView::from(&connector.meta),
            id: connector.id,
            name: connector.name,
            connector_type_id: connector.connector_type_id,
            namespace_id: connector.namespace_id,
            cluster_id: connector.cluster_id,
            channel: connector.channel,
            desired_state: connector.desired,
            state: connector.actual,
            kafka: KafkaView {
                bootstrap_server: connector.kafka.bootstrap_server,
                client_id: connector.kafka.client_id,
            },
            schema_registry: connector.schema_registry,
            service_account: ServiceAccountView {
                client_id: connector.service_account.client_id,
            },
            connector: connector.connector,
        }
    }
}

/// A list body with its length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> ListResponse<T> {
    pub fn from_rows<R>(rows: Vec<R>) -> Self
    where
        T: From<R>,
    {
        let items: Vec<T> = rows.into_iter().map(T::from).collect();
        Self {
            total: items.len(),
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use fleet_model::ConnectorSpec;

    use super::*;

    #[test]
    fn test_connector_view_hides_secrets() {
        let mut spec = ConnectorSpec::new("sink", "log_sink_0.1", NamespaceId::new(), "kafka:9092");
        spec.kafka.client_id = "kafka-client".to_string();
        spec.kafka.client_secret = "kafka-secret".to_string();
        spec.service_account.client_id = "sa-client".to_string();
        spec.service_account.client_secret = "sa-secret".to_string();
        let connector = Connector::new(spec, Utc::now()).unwrap();

        let json = serde_json::to_string(&ConnectorView::from(connector)).unwrap();

        assert!(json.contains("kafka-client"));
        assert!(json.contains("sa-client"));
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_list_response_counts_items() {
        let spec = fleet_model::ClusterSpec::new("aws", "us-east-1");
        let cluster = Cluster::new(spec, Utc::now()).unwrap();
        let list: ListResponse<ClusterView> = ListResponse::from_rows(vec![cluster]);

        assert_eq!(list.total, 1);
        assert_eq!(list.items.len(), 1);
    }
}
