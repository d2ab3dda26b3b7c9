//! Application Error
//!
//! Maps request failures to HTTP status codes with a
//! `{ "success": false, "error": ... }` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use super::protocol::ErrorResponse;
use crate::service::CdnError;
use crate::store::StoreError;

/// Application-level error type that maps to HTTP responses
#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("revision conflict on '{0}', retry the request")]
    RevisionConflict(String),

    #[error("remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RevisionConflict(_) => StatusCode::CONFLICT,
            AppError::RemoteUnavailable(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<CdnError> for AppError {
    fn from(e: CdnError) -> Self {
        match e {
            CdnError::Validation(msg) => AppError::Validation(msg),
            CdnError::Store(StoreError::NotFound(path)) => AppError::NotFound(path),
            CdnError::Store(StoreError::RevisionConflict(path)) => AppError::RevisionConflict(path),
            CdnError::Store(StoreError::RemoteUnavailable(msg)) => AppError::RemoteUnavailable(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
