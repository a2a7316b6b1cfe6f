use axum::{
    body::{Body, Bytes},
    extract::{rejection::QueryRejection, FromRequest, FromRequestParts, Query, Request},
    http::{header, request::Parts, StatusCode},
};
use serde::de::DeserializeOwned;

use crate::core::error::AppError;
use crate::shared::multipart::{self, ParsedForm};

/// multipart/form-data extractor backed by `shared::multipart`
///
/// The boundary is checked before any body byte is read. The body size is
/// bounded by the route's `DefaultBodyLimit`.
pub struct FormData(pub ParsedForm);

impl<S> FromRequest<S> for FormData
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request<Body>, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let boundary = multipart::parse_boundary(content_type)?;

        let body = Bytes::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                AppError::PayloadTooLarge("Request body exceeds the upload size limit".to_string())
            } else {
                AppError::BadRequest(format!("Failed to read request body: {}", rejection))
            }
        })?;

        Ok(Self(multipart::parse_form_data(body, &boundary).await))
    }
}

/// Query string extractor that provides consistent error responses
pub struct AppQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(value) => Ok(Self(value.0)),
            Err(QueryRejection::FailedToDeserializeQueryString(err)) => Err(
                AppError::BadRequest(format!("Invalid query string: {}", err)),
            ),
            Err(rejection) => Err(AppError::BadRequest(rejection.body_text())),
        }
    }
}
