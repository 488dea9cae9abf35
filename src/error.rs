// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Import job not found")]
    JobNotFound,

    #[error("Import job cannot be resumed")]
    JobNotResumable,

    #[error("Immich API error: {0}")]
    Immich(String),

    #[error("Immich not configured")]
    ImmichNotConfigured,

    #[error("Geocoding error: {0}")]
    Geocoding(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::JobNotFound => (StatusCode::NOT_FOUND, "job_not_found", None),
            AppError::JobNotResumable => (StatusCode::BAD_REQUEST, "job_not_resumable", None),
            AppError::Immich(msg) => (StatusCode::BAD_GATEWAY, "immich_error", Some(msg.clone())),
            AppError::ImmichNotConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                "immich_not_configured",
                Some("Set IMMICH_URL and IMMICH_API_KEY".to_string()),
            ),
            AppError::Geocoding(msg) => {
                (StatusCode::BAD_GATEWAY, "geocoding_error", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
