//! Control-plane services over the desired-state store.
//!
//! - [`DesiredStateService`]: validated user writes
//! - [`AgentReportIngest`]: status batches pushed by agents
//! - [`WorkDispatchView`]: work listings polled by agents
//! - [`NamespaceResolver`]: connector placement with capacity checks

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod assignment;
pub mod desired;
pub mod dispatch;
pub mod ingest;
pub mod trigger;

pub use assignment::NamespaceResolver;
pub use desired::DesiredStateService;
pub use dispatch::{ClusterWork, ConnectorWork, WorkDispatchView, WorkSnapshot};
pub use ingest::AgentReportIngest;
pub use trigger::ReconcileTrigger;
