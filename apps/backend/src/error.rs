//! Application error types for the SoundVault backend.
//!
//! Provides a unified error type that implements `IntoResponse` for Axum.
//! Every error renders as a JSON body of the form `{"error": "<message>"}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::db::DbError;
use crate::services::delivery::DeliveryError;
use crate::services::storage::StorageError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// SQLite-specific errors (for direct rusqlite usage)
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration loading/parsing errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Storage adapter errors outside the download flow
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Download flow errors
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authentication required
    #[error("Unauthorized")]
    Unauthorized,

    /// Insufficient permissions
    #[error("Forbidden")]
    Forbidden,

    /// Invalid request data
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Database(e) => {
                // Log full error details but don't expose to client
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Sqlite(e) => {
                tracing::error!("SQLite error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Configuration error".to_string(),
                )
            }
            AppError::Storage(StorageError::NotFound(reference)) => {
                tracing::debug!(reference = %reference, "Stored file missing");
                (StatusCode::NOT_FOUND, "File not found".to_string())
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                )
            }
            AppError::Delivery(e) => delivery_status(e),
            AppError::NotFound(resource) => (StatusCode::NOT_FOUND, resource.clone()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication credentials were not provided or are invalid".to_string(),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "You do not have permission to perform this action".to_string(),
            ),
            // Bad request messages are safe to expose (client-caused errors)
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        }
    }
}

fn delivery_status(error: &DeliveryError) -> (StatusCode, String) {
    match error {
        DeliveryError::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            "Authentication credentials were not provided or are invalid".to_string(),
        ),
        DeliveryError::NotFound => (StatusCode::NOT_FOUND, "Track not found".to_string()),
        DeliveryError::NoFileAssociated => (
            StatusCode::NOT_FOUND,
            "No file associated with this track".to_string(),
        ),
        DeliveryError::FileNotFound => (
            StatusCode::NOT_FOUND,
            "File not found on server".to_string(),
        ),
        DeliveryError::DeliveryFailed(detail) => {
            tracing::error!(error = %detail, "Download failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Download failed".to_string(),
            )
        }
        DeliveryError::Database(e) => {
            tracing::error!("Catalog error during download: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
            )
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_message();
        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_not_found_status() {
        let error = AppError::NotFound("test".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_unauthorized_status() {
        let error = AppError::Unauthorized;
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_bad_request_status() {
        let error = AppError::BadRequest("invalid".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_forbidden_status() {
        let error = AppError::Forbidden;
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_delivery_statuses() {
        let cases = [
            (DeliveryError::Unauthorized, StatusCode::UNAUTHORIZED),
            (DeliveryError::NotFound, StatusCode::NOT_FOUND),
            (DeliveryError::NoFileAssociated, StatusCode::NOT_FOUND),
            (DeliveryError::FileNotFound, StatusCode::NOT_FOUND),
            (
                DeliveryError::DeliveryFailed("bucket unreachable".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            let response = AppError::from(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = AppError::from(DeliveryError::FileNotFound).into_response();
        let body = body_json(response).await;
        assert_eq!(body, serde_json::json!({"error": "File not found on server"}));
    }

    #[tokio::test]
    async fn test_delivery_failed_hides_detail() {
        let response =
            AppError::from(DeliveryError::DeliveryFailed("secret bucket name".to_string()))
                .into_response();
        let body = body_json(response).await;
        assert_eq!(body["error"], "Download failed");
        assert!(!body.to_string().contains("secret bucket name"));
    }
}
