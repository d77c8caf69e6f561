//! Connector instances and their connection settings.

use chrono::{DateTime, Utc};
use fleet_core::{ClusterId, ConnectorId, ConnectorTypeId, Error, NamespaceId, ResourceKind, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::Channel;
use crate::meta::{PendingAction, RowMeta};
use crate::resource::Reconcilable;
use crate::state::{ConnectorDesiredState, ConnectorEvent, ConnectorState};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KafkaConnectionSettings {
    pub bootstrap_server: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRegistryConnectionSettings {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

/// A request to create a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorSpec {
    pub name: String,
    pub connector_type_id: ConnectorTypeId,
    pub namespace_id: NamespaceId,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default = "default_desired")]
    pub desired_state: ConnectorDesiredState,
    pub kafka: KafkaConnectionSettings,
    #[serde(default)]
    pub schema_registry: Option<SchemaRegistryConnectionSettings>,
    #[serde(default)]
    pub service_account: ServiceAccount,
    #[serde(default)]
    pub connector: Value,
}

const fn default_desired() -> ConnectorDesiredState {
    ConnectorDesiredState::Ready
}

impl ConnectorSpec {
    pub fn new(
        name: impl Into<String>,
        connector_type_id: impl Into<String>,
        namespace_id: NamespaceId,
        bootstrap_server: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            connector_type_id: ConnectorTypeId::new(connector_type_id),
            namespace_id,
            channel: Channel::Stable,
            desired_state: ConnectorDesiredState::Ready,
            kafka: KafkaConnectionSettings {
                bootstrap_server: bootstrap_server.into(),
                ..KafkaConnectionSettings::default()
            },
            schema_registry: None,
            service_account: ServiceAccount::default(),
            connector: Value::Object(serde_json::Map::new()),
        }
    }

    #[must_use]
    pub fn with_configuration(mut self, connector: Value) -> Self {
        self.connector = connector;
        self
    }
}

/// Changes to a connector; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorPatch {
    pub name: Option<String>,
    pub desired_state: Option<ConnectorDesiredState>,
    pub kafka: Option<KafkaConnectionSettings>,
    pub schema_registry: Option<SchemaRegistryConnectionSettings>,
    pub service_account: Option<ServiceAccount>,
    pub connector: Option<Value>,
}

impl ConnectorPatch {
    /// True when the patch changes what the agent has to deploy.
    pub fn changes_deployment(&self) -> bool {
        self.kafka.is_some()
            || self.schema_registry.is_some()
            || self.service_account.is_some()
            || self.connector.is_some()
    }

    pub fn apply_to(&self, connector: &mut Connector, now: DateTime<Utc>) -> Result<()> {
        if let Some(name) = &self.name {
            validate_name(name)?;
            connector.name.clone_from(name);
        }
        if let Some(kafka) = &self.kafka {
            connector.kafka = kafka.clone();
        }
        if let Some(registry) = &self.schema_registry {
            connector.schema_registry = Some(registry.clone());
        }
        if let Some(account) = &self.service_account {
            connector.service_account = account.clone();
        }
        if let Some(configuration) = &self.connector {
            connector.connector = configuration.clone();
        }
        if let Some(desired) = self.desired_state {
            if desired != connector.desired {
                connector.desired = desired;
                connector.meta.mark_desired_changed(now);
            }
        }
        if self.changes_deployment() {
            // New settings mean the agent has something to roll out again.
            connector.meta.desired_changed_at = now;
            connector.meta.clear_pending();
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    pub id: ConnectorId,
    pub name: String,
    pub connector_type_id: ConnectorTypeId,
    pub namespace_id: NamespaceId,
    /// Set once the connector is placed on a cluster.
    pub cluster_id: Option<ClusterId>,
    pub channel: Channel,
    pub desired: ConnectorDesiredState,
    pub actual: Option<ConnectorState>,
    pub kafka: KafkaConnectionSettings,
    pub schema_registry: Option<SchemaRegistryConnectionSettings>,
    pub service_account: ServiceAccount,
    pub connector: Value,
    pub meta: RowMeta,
}

impl Connector {
    /// Build an unsaved, unassigned connector from a request.
    pub fn new(spec: ConnectorSpec, now: DateTime<Utc>) -> Result<Self> {
        validate_name(&spec.name)?;
        if spec.kafka.bootstrap_server.trim().is_empty() {
            return Err(Error::invalid_configuration("/kafka/bootstrap_server: required"));
        }
        if spec.desired_state == ConnectorDesiredState::Deleted {
            return Err(Error::invalid_configuration(
                "/desired_state: a connector cannot be created as deleted",
            ));
        }

        Ok(Self {
            id: ConnectorId::new(),
            name: spec.name,
            connector_type_id: spec.connector_type_id,
            namespace_id: spec.namespace_id,
            cluster_id: None,
            channel: spec.channel,
            desired: spec.desired_state,
            actual: None,
            kafka: spec.kafka,
            schema_registry: spec.schema_registry,
            service_account: spec.service_account,
            connector: spec.connector,
            meta: RowMeta::new(now),
        })
    }

    pub const fn is_assigned(&self) -> bool {
        self.cluster_id.is_some()
    }

    /// Natural key among live connectors.
    pub fn natural_key(&self) -> String {
        format!("{}/{}", self.namespace_id, self.name)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid_configuration("/name: required"));
    }
    if name.len() > 255 {
        return Err(Error::invalid_configuration(
            "/name: must be at most 255 characters",
        ));
    }
    Ok(())
}

impl Reconcilable for Connector {
    type Desired = ConnectorDesiredState;
    type Actual = ConnectorState;
    type Event = ConnectorEvent;

    const KIND: ResourceKind = ResourceKind::Connector;
    const STALLED: ConnectorEvent = ConnectorEvent::Stalled;
    const REPORT_REJECTED: ConnectorEvent = ConnectorEvent::ReportRejected;

    fn id_string(&self) -> String {
        self.id.to_string()
    }

    fn desired(&self) -> ConnectorDesiredState {
        self.desired
    }

    fn actual(&self) -> Option<ConnectorState> {
        self.actual
    }

    fn meta(&self) -> &RowMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RowMeta {
        &mut self.meta
    }

    fn next_actual(&self, event: ConnectorEvent) -> Result<ConnectorState> {
        ConnectorState::transition(self.actual, event)
    }

    fn set_actual(&mut self, actual: ConnectorState) {
        self.actual = Some(actual);
    }

    fn is_delete_requested(&self) -> bool {
        self.desired == ConnectorDesiredState::Deleted
    }

    fn is_converged(&self) -> bool {
        self.actual.is_some_and(|state| state.satisfies(self.desired))
    }

    fn is_settling(&self) -> bool {
        self.actual.is_some_and(|state| state.is_settling())
    }

    fn is_failed(&self) -> bool {
        self.actual == Some(ConnectorState::Failed)
    }

    fn is_removed(&self) -> bool {
        self.actual == Some(ConnectorState::Deleted)
    }

    fn request_delete(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.actual.is_none() {
            self.meta.soft_delete(now);
        } else {
            self.meta.claim(PendingAction::Delete, now);
        }
        Ok(())
    }
}
