//! Server setup with Tower middleware

use std::future::Future;
use std::net::SocketAddr;

use axum::{
    Router,
    http::{HeaderValue, Method},
};
use fleet_core::FleetConfig;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::routes;
use crate::state::AppState;

/// Web server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid CORS origin: {0}")]
    InvalidHeader(#[from] axum::http::header::InvalidHeaderValue),

    #[error(transparent)]
    Config(#[from] fleet_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    /// `*` allows any origin.
    pub cors_origin: String,
}

impl ServerConfig {
    pub fn from_config(config: &FleetConfig) -> Result<Self, ServerError> {
        Ok(Self {
            bind_address: config.bind_address()?,
            cors_origin: config.server.cors_origin.clone(),
        })
    }
}

/// Build the application: routes, state and middleware.
pub fn create_app(state: AppState, cors_origin: &str) -> Result<Router, ServerError> {
    let origin = if cors_origin == "*" {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::exact(cors_origin.parse::<HeaderValue>()?)
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers(Any);

    Ok(routes::create_router().with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(cors),
    ))
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(
    config: &ServerConfig,
    state: AppState,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_app(state, &config.cors_origin)?;
    let listener = TcpListener::bind(config.bind_address).await?;
    info!(address = %config.bind_address, "fleet API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("fleet API stopped");
    Ok(())
}
