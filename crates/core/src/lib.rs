//! Shared building blocks for the fleet control plane.
//!
//! Typed ids, the error taxonomy every crate returns, and the layered
//! configuration the binary loads at startup.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod error;
pub mod ids;
pub mod result;

pub use config::FleetConfig;
pub use error::{Error, ResourceKind};
pub use ids::{ClusterId, ConnectorId, ConnectorTypeId, NamespaceId};
pub use result::Result;
