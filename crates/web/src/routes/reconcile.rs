//! Operator trigger

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub message: String,
}

/// POST /reconcile - Wake the reconciliation loop
pub async fn trigger_reconcile(
    State(state): State<AppState>,
) -> (StatusCode, Json<ReconcileResponse>) {
    state.trigger.notify();
    info!("reconcile sweep requested");
    (
        StatusCode::ACCEPTED,
        Json(ReconcileResponse {
            message: "reconcile sweep requested".to_string(),
        }),
    )
}
