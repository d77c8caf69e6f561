//! REST API routes
//!
//! Everything is mounted under [`API_PREFIX`]. Agent endpoints live under
//! `agent_clusters/`.
//!
//! ## Route Structure
//!
//! - `GET /health`
//! - `POST|GET /clusters`, `GET|DELETE /clusters/{id}`
//! - `POST|GET /namespaces`, `GET|PATCH|DELETE /namespaces/{id}`
//! - `GET /connector_types`, `GET /connector_types/{id}`
//! - `POST|GET /connectors`, `GET|PATCH|DELETE /connectors/{id}`,
//!   `POST /connectors/{id}/retry`
//! - `GET /agent_clusters/{id}`, `GET /agent_clusters/{id}/work`,
//!   `PUT /agent_clusters/{id}/status`, `PUT /agent_clusters/{id}/connectors/status`
//! - `POST /reconcile`

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::state::AppState;

pub mod agent;
pub mod clusters;
pub mod connector_types;
pub mod connectors;
pub mod health;
pub mod namespaces;
pub mod reconcile;

pub const API_PREFIX: &str = "/api/connector_mgmt/v1";

/// Assemble every route module into one router.
pub fn create_router() -> Router<AppState> {
    let agent_routes = Router::new()
        .route("/{id}", get(agent::get_cluster_work))
        .route("/{id}/work", get(agent::list_pending_work))
        .route("/{id}/status", put(agent::put_cluster_status))
        .route("/{id}/connectors/status", put(agent::put_connector_statuses));

    let api_routes = Router::new()
        .route("/health", get(health::health_check))
        // Clusters
        .route("/clusters", post(clusters::create_cluster).get(clusters::list_clusters))
        .route("/clusters/{id}", get(clusters::get_cluster).delete(clusters::delete_cluster))
        // Namespaces
        .route(
            "/namespaces",
            post(namespaces::create_namespace).get(namespaces::list_namespaces),
        )
        .route(
            "/namespaces/{id}",
            get(namespaces::get_namespace)
                .patch(namespaces::patch_namespace)
                .delete(namespaces::delete_namespace),
        )
        // Catalog
        .route("/connector_types", get(connector_types::list_connector_types))
        .route("/connector_types/{id}", get(connector_types::get_connector_type))
        // Connectors
        .route(
            "/connectors",
            post(connectors::create_connector).get(connectors::list_connectors),
        )
        .route(
            "/connectors/{id}",
            get(connectors::get_connector)
                .patch(connectors::patch_connector)
                .delete(connectors::delete_connector),
        )
        .route("/connectors/{id}/retry", post(connectors::retry_connector))
        .route("/reconcile", post(reconcile::trigger_reconcile))
        .nest("/agent_clusters", agent_routes);

    Router::new().nest(API_PREFIX, api_routes)
}
