//! Error handling with RFC 7807 Problem Details for JSON responses

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use fleet_core::Error;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Control(#[from] Error),

    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Control(error) => match error {
                Error::NotFound { .. } => StatusCode::NOT_FOUND,
                Error::Conflict { .. }
                | Error::VersionMismatch { .. }
                | Error::InvalidTransition { .. } => StatusCode::CONFLICT,
                Error::NotOwnedByCluster { .. } => StatusCode::FORBIDDEN,
                Error::ClusterNotReady { .. } | Error::CapacityExceeded { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                Error::InvalidConfiguration { .. } | Error::InvalidId { .. } => {
                    StatusCode::BAD_REQUEST
                }
                Error::Storage { .. } => StatusCode::SERVICE_UNAVAILABLE,
                Error::InvalidConfig { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Machine-readable code carried in the problem document.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Control(error) => error.code(),
            Self::BadRequest(_) => "bad_request",
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// RFC 7807 Problem Details for HTTP APIs
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub problem_type: Option<String>,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
}

impl ErrorResponse {
    pub fn from_error(err: &AppError) -> Self {
        let status = err.status_code();
        let title = status
            .canonical_reason()
            .map_or_else(|| "Error".to_string(), ToString::to_string);
        let violations = match err {
            AppError::Control(Error::InvalidConfiguration { violations }) => violations.clone(),
            _ => Vec::new(),
        };

        Self {
            problem_type: None,
            title,
            status: status.as_u16(),
            detail: err.to_string(),
            code: err.code().to_string(),
            violations,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "request failed");
        } else {
            debug!(code = self.code(), error = %self, "request refused");
        }
        let response = ErrorResponse::from_error(&self);
        (status, Json(response)).into_response()
    }
}
