#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # Fleet
//!
//! Control plane for data-plane clusters and the connectors they run.
//!
//! The binary wires the workspace crates together: a store, the control
//! services, the reconciliation loop and the HTTP API.

pub mod app;
pub mod cli;
pub mod telemetry;

pub use app::Fleet;
