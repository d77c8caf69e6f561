//! Agent endpoints: work polling and status reports.
//!
//! The cluster id in the path is the caller's identity; reports naming
//! resources on other clusters are rejected item by item.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    response::Json,
};
use fleet_control::{ClusterWork, WorkSnapshot};
use fleet_core::ClusterId;
use fleet_model::{ClusterStatus, IngestReport, StatusReport};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ClusterWorkResponse {
    pub cluster_id: ClusterId,
    /// `None` when the cluster has nothing to act on.
    pub work: Option<ClusterWork>,
}

/// Body of a cluster status report; the id comes from the path.
#[derive(Debug, Deserialize)]
pub struct ClusterStatusRequest {
    pub status: ClusterStatus,
    pub resource_version: u64,
    #[serde(default)]
    pub message: Option<String>,
}

/// GET /agent_clusters/{id}
pub async fn get_cluster_work(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ClusterWorkResponse>> {
    let id: ClusterId = id.parse()?;
    let snapshot = state.dispatch.list_pending_work(id).await?;
    Ok(Json(ClusterWorkResponse {
        cluster_id: id,
        work: snapshot.cluster,
    }))
}

/// GET /agent_clusters/{id}/work
pub async fn list_pending_work(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<WorkSnapshot>> {
    let id: ClusterId = id.parse()?;
    Ok(Json(state.dispatch.list_pending_work(id).await?))
}

/// PUT /agent_clusters/{id}/status
pub async fn put_cluster_status(
    Path(id): Path<String>,
    State(state): State<AppState>,
    payload: std::result::Result<Json<ClusterStatusRequest>, JsonRejection>,
) -> Result<Json<IngestReport>> {
    let id: ClusterId = id.parse()?;
    let Json(request) = payload?;
    let report = StatusReport::Cluster {
        id,
        status: request.status,
        resource_version: request.resource_version,
        message: request.message,
    };
    Ok(Json(state.ingest.ingest(id, vec![report]).await?))
}

/// PUT /agent_clusters/{id}/connectors/status
pub async fn put_connector_statuses(
    Path(id): Path<String>,
    State(state): State<AppState>,
    payload: std::result::Result<Json<Vec<StatusReport>>, JsonRejection>,
) -> Result<Json<IngestReport>> {
    let id: ClusterId = id.parse()?;
    let Json(reports) = payload?;
    Ok(Json(state.ingest.ingest(id, reports).await?))
}
