//! Namespace endpoints

use axum::{
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::Json,
};
use fleet_core::{ClusterId, NamespaceId};
use fleet_model::{NamespacePatch, NamespaceSpec};
use serde::Deserialize;

use crate::error::Result;
use crate::state::AppState;
use crate::views::{ListResponse, NamespaceView};

#[derive(Debug, Default, Deserialize)]
pub struct NamespaceFilter {
    pub cluster_id: Option<ClusterId>,
}

/// A namespace patch guarded by the version the caller last saw.
#[derive(Debug, Deserialize)]
pub struct NamespacePatchRequest {
    pub resource_version: u64,
    #[serde(flatten)]
    pub patch: NamespacePatch,
}

/// POST /namespaces
pub async fn create_namespace(
    State(state): State<AppState>,
    payload: std::result::Result<Json<NamespaceSpec>, JsonRejection>,
) -> Result<(StatusCode, Json<NamespaceView>)> {
    let Json(spec) = payload?;
    let namespace = state.desired.create_namespace(spec).await?;
    Ok((StatusCode::CREATED, Json(namespace.into())))
}

/// GET /namespaces?cluster_id=
pub async fn list_namespaces(
    State(state): State<AppState>,
    filter: std::result::Result<Query<NamespaceFilter>, QueryRejection>,
) -> Result<Json<ListResponse<NamespaceView>>> {
    let Query(filter) = filter?;
    let namespaces = state.desired.list_namespaces(filter.cluster_id).await?;
    Ok(Json(ListResponse::from_rows(namespaces)))
}

/// GET /namespaces/{id}
pub async fn get_namespace(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<NamespaceView>> {
    let id: NamespaceId = id.parse()?;
    Ok(Json(state.desired.get_namespace(id).await?.into()))
}

/// PATCH /namespaces/{id}
pub async fn patch_namespace(
    Path(id): Path<String>,
    State(state): State<AppState>,
    payload: std::result::Result<Json<NamespacePatchRequest>, JsonRejection>,
) -> Result<Json<NamespaceView>> {
    let id: NamespaceId = id.parse()?;
    let Json(request) = payload?;
    let namespace = state
        .desired
        .patch_namespace(id, &request.patch, request.resource_version)
        .await?;
    Ok(Json(namespace.into()))
}

/// DELETE /namespaces/{id}
pub async fn delete_namespace(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<NamespaceView>> {
    let id: NamespaceId = id.parse()?;
    Ok(Json(state.desired.delete_namespace(id).await?.into()))
}
