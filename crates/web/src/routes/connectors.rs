//! Connector endpoints
//!
//! Responses go through [`ConnectorView`], which drops client secrets.

use axum::{
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::Json,
};
use fleet_core::{ConnectorId, NamespaceId};
use fleet_model::{ConnectorPatch, ConnectorSpec};
use serde::Deserialize;

use crate::error::Result;
use crate::state::AppState;
use crate::views::{ConnectorView, ListResponse};

#[derive(Debug, Default, Deserialize)]
pub struct ConnectorFilter {
    pub namespace_id: Option<NamespaceId>,
}

/// A connector patch guarded by the version the caller last saw.
#[derive(Debug, Deserialize)]
pub struct ConnectorPatchRequest {
    pub resource_version: u64,
    #[serde(flatten)]
    pub patch: ConnectorPatch,
}

/// POST /connectors - Create a connector and try to place it
pub async fn create_connector(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ConnectorSpec>, JsonRejection>,
) -> Result<(StatusCode, Json<ConnectorView>)> {
    let Json(spec) = payload?;
    let connector = state.desired.create_connector(spec).await?;
    Ok((StatusCode::CREATED, Json(connector.into())))
}

/// GET /connectors?namespace_id=
pub async fn list_connectors(
    State(state): State<AppState>,
    filter: std::result::Result<Query<ConnectorFilter>, QueryRejection>,
) -> Result<Json<ListResponse<ConnectorView>>> {
    let Query(filter) = filter?;
    let connectors = state.desired.list_connectors(filter.namespace_id).await?;
    Ok(Json(ListResponse::from_rows(connectors)))
}

/// GET /connectors/{id}
pub async fn get_connector(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ConnectorView>> {
    let id: ConnectorId = id.parse()?;
    Ok(Json(state.desired.get_connector(id).await?.into()))
}

/// PATCH /connectors/{id}
pub async fn patch_connector(
    Path(id): Path<String>,
    State(state): State<AppState>,
    payload: std::result::Result<Json<ConnectorPatchRequest>, JsonRejection>,
) -> Result<Json<ConnectorView>> {
    let id: ConnectorId = id.parse()?;
    let Json(request) = payload?;
    let connector = state
        .desired
        .patch_connector(id, &request.patch, request.resource_version)
        .await?;
    Ok(Json(connector.into()))
}

/// DELETE /connectors/{id} - Mark for deletion
pub async fn delete_connector(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ConnectorView>)> {
    let id: ConnectorId = id.parse()?;
    let connector = state.desired.delete_connector(id).await?;
    Ok((StatusCode::ACCEPTED, Json(connector.into())))
}

/// POST /connectors/{id}/retry - Re-place a failed connector
pub async fn retry_connector(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ConnectorView>> {
    let id: ConnectorId = id.parse()?;
    Ok(Json(state.desired.retry_connector(id).await?.into()))
}
