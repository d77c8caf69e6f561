//! HTTP API for the fleet control plane.
//!
//! User endpoints write desired state; agent endpoints poll for work and
//! push status reports. Handlers are thin: every rule lives in
//! `fleet-control`.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod routes;
pub mod server;
pub mod state;
pub mod views;

pub use error::{AppError, ErrorResponse};
pub use routes::{API_PREFIX, create_router};
pub use server::{ServerConfig, ServerError, create_app, serve};
pub use state::AppState;
