use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::shared::multipart::MultipartError;
use crate::shared::types::ErrorResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("No multipart boundary found in Content-Type header")]
    MissingBoundary,

    #[error("Missing file: {0}")]
    MissingFile(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Storage backend error: {message}: {details}")]
    StorageBackend {
        message: String,
        details: String,
        /// Diagnostic detail, only populated in development
        debug: Option<String>,
    },
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        match e {
            MultipartError::MissingBoundary => AppError::MissingBoundary,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::MissingBoundary => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new("No multipart boundary found in Content-Type header"),
            ),
            AppError::MissingFile(msg)
            | AppError::MissingParameter(msg)
            | AppError::UnsupportedMediaType(msg)
            | AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::new(msg)),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, ErrorResponse::new(msg))
            }
            AppError::MethodNotAllowed(msg) => {
                (StatusCode::METHOD_NOT_ALLOWED, ErrorResponse::new(msg))
            }
            AppError::StorageBackend {
                message,
                details,
                debug,
            } => {
                tracing::error!("Storage backend error: {}: {}", message, details);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: message,
                        details: Some(details),
                        debug,
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
