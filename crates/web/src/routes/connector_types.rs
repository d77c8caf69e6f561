//! Connector type catalog endpoints

use axum::{
    extract::{Path, State},
    response::Json,
};
use fleet_core::ConnectorTypeId;
use fleet_model::ConnectorType;

use crate::error::Result;
use crate::state::AppState;
use crate::views::ListResponse;

/// GET /connector_types
pub async fn list_connector_types(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<ConnectorType>>> {
    let types = state.desired.list_connector_types().await?;
    Ok(Json(ListResponse::from_rows(types)))
}

/// GET /connector_types/{id}
pub async fn get_connector_type(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ConnectorType>> {
    let id: ConnectorTypeId = id.parse()?;
    Ok(Json(state.desired.get_connector_type(&id).await?))
}
