//! Entities and state machines for clusters, namespaces and connectors.
//!
//! Everything here is pure data and pure functions. Persistence lives in
//! `fleet-store`, orchestration in `fleet-control` and `fleet-reconciler`.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod catalog;
pub mod cluster;
pub mod connector;
pub mod meta;
pub mod namespace;
pub mod report;
pub mod resource;
pub mod schema;
pub mod state;

pub use catalog::{parse_catalog, Channel, ConnectorType};
pub use cluster::{Cluster, ClusterSpec};
pub use connector::{
    Connector, ConnectorPatch, ConnectorSpec, KafkaConnectionSettings,
    SchemaRegistryConnectionSettings, ServiceAccount,
};
pub use meta::{PendingAction, RowMeta};
pub use namespace::{Namespace, NamespacePatch, NamespaceSpec};
pub use report::{AckError, AckOutcome, IngestReport, ReportAck, StatusReport};
pub use resource::Reconcilable;
pub use state::{
    ClusterDesiredState, ClusterEvent, ClusterStatus, ConnectorDesiredState, ConnectorEvent,
    ConnectorState,
};
