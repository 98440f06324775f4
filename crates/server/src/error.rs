//! Unified error handling for the web application.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use facturio_core::CredentialError;

use crate::clients::ClientError;
use crate::db::RepositoryError;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Remote API operation failed.
    #[error("Remote API error: {0}")]
    Client(#[from] ClientError),

    /// Tenant credentials are missing or incomplete.
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User lacks permission.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Database(e) => match e {
                RepositoryError::NotFound => StatusCode::NOT_FOUND,
                RepositoryError::DuplicateInvoice | RepositoryError::Conflict(_) => {
                    StatusCode::CONFLICT
                }
                RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Client(e) => match e {
                ClientError::NotFound(_) => StatusCode::NOT_FOUND,
                ClientError::Credentials(_) => StatusCode::UNAUTHORIZED,
                ClientError::Upstream { .. } | ClientError::Http(_) | ClientError::Parse(_) => {
                    StatusCode::BAD_GATEWAY
                }
            },
            // Credentials must be configured before any outbound call is
            // attempted; surfaced like the original's 401.
            Self::Credentials(_) | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "request error");
        }

        // Don't expose internal details to clients; remote API messages
        // are user-visible (the caller needs the upstream reason).
        let message = match &self {
            Self::Database(RepositoryError::Database(_) | RepositoryError::DataCorruption(_))
            | Self::Internal(_) => "Internal server error".to_owned(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("order 80300246".to_owned());
        assert_eq!(err.to_string(), "Not found: order 80300246");

        let err = AppError::BadRequest("invalid status".to_owned());
        assert_eq!(err.to_string(), "Bad request: invalid status");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Forbidden("x".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_duplicate_invoice_maps_to_conflict() {
        let err = AppError::Database(RepositoryError::DuplicateInvoice);
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_upstream_error_maps_to_bad_gateway() {
        let err = AppError::Client(ClientError::Upstream {
            status: 503,
            message: "maintenance".to_owned(),
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_incomplete_credentials_map_to_unauthorized() {
        let err = AppError::Credentials(CredentialError::Incomplete {
            api: "trendyol",
            field: "api_key",
        });
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_internal_error_response_status() {
        let response =
            AppError::Internal("connection pool exhausted at 10.0.0.3".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
