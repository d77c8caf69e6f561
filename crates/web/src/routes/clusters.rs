//! Cluster endpoints

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use fleet_core::ClusterId;
use fleet_model::ClusterSpec;

use crate::error::Result;
use crate::state::AppState;
use crate::views::{ClusterView, ListResponse};

/// POST /clusters - Register a cluster
pub async fn create_cluster(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ClusterSpec>, JsonRejection>,
) -> Result<(StatusCode, Json<ClusterView>)> {
    let Json(spec) = payload?;
    let cluster = state.desired.create_cluster(spec).await?;
    Ok((StatusCode::CREATED, Json(cluster.into())))
}

/// GET /clusters
pub async fn list_clusters(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<ClusterView>>> {
    let clusters = state.desired.list_clusters().await?;
    Ok(Json(ListResponse::from_rows(clusters)))
}

/// GET /clusters/{id}
pub async fn get_cluster(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ClusterView>> {
    let id: ClusterId = id.parse()?;
    Ok(Json(state.desired.get_cluster(id).await?.into()))
}

/// DELETE /clusters/{id} - Request teardown
pub async fn delete_cluster(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ClusterView>)> {
    let id: ClusterId = id.parse()?;
    let cluster = state.desired.delete_cluster(id).await?;
    Ok((StatusCode::ACCEPTED, Json(cluster.into())))
}
