use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::debug;

use crate::core::error::AppError;
use crate::core::extractor::{AppQuery, FormData};
use crate::features::media::dtos::{
    ListMediaQuery, MediaDescriptor, SignatureResponseDto, UploadMediaDto,
};
use crate::features::media::services::MediaService;
use crate::shared::types::{ApiResponse, ErrorResponse};

/// Upload an image or video
///
/// Accepts multipart/form-data with:
/// - `file`: The image or video to upload (required)
/// - `userId`: Owner of the upload (optional, defaults to the configured placeholder user)
#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "media",
    request_body(
        content = UploadMediaDto,
        content_type = "multipart/form-data",
        description = "Media upload form with an optional userId field",
    ),
    responses(
        (status = 200, description = "Media uploaded successfully", body = ApiResponse<MediaDescriptor>),
        (status = 400, description = "Missing boundary, missing file or unsupported media type", body = ErrorResponse),
        (status = 413, description = "Request body too large", body = ErrorResponse),
        (status = 500, description = "Storage backend rejected the upload", body = ErrorResponse)
    )
)]
pub async fn upload_media(
    State(service): State<Arc<MediaService>>,
    FormData(form): FormData,
) -> Result<Json<ApiResponse<MediaDescriptor>>, AppError> {
    debug!(
        "Decoded upload form: {} fields, {} files",
        form.fields.len(),
        form.files.len()
    );

    let outcome = service.upload(form).await?;
    let message = format!("File uploaded to {}", outcome.media.storage);

    Ok(Json(
        ApiResponse::success(outcome.media, 1)
            .with_message(message)
            .with_user_id(outcome.user_id),
    ))
}

/// List a user's media across every configured backend, newest first
#[utoipa::path(
    get,
    path = "/api/get-photos",
    tag = "media",
    params(ListMediaQuery),
    responses(
        (status = 200, description = "Merged media listing", body = ApiResponse<Vec<MediaDescriptor>>),
        (status = 400, description = "userId query parameter missing", body = ErrorResponse)
    )
)]
pub async fn list_media(
    State(service): State<Arc<MediaService>>,
    AppQuery(query): AppQuery<ListMediaQuery>,
) -> Result<Json<ApiResponse<Vec<MediaDescriptor>>>, AppError> {
    let user_id = query.user_id().ok_or_else(|| {
        AppError::MissingParameter("userId query parameter is required".to_string())
    })?;

    let listing = service.list(user_id).await?;
    let count = listing.items.len();

    Ok(Json(
        ApiResponse::success(listing.items, count)
            .with_user_id(user_id)
            .with_sources(listing.sources),
    ))
}

/// Sign a direct client upload to Cloudinary
#[utoipa::path(
    get,
    path = "/api/sign-upload",
    tag = "media",
    responses(
        (status = 200, description = "Signed upload parameters", body = SignatureResponseDto),
        (status = 500, description = "Cloudinary is not configured", body = ErrorResponse)
    )
)]
pub async fn sign_upload(
    State(service): State<Arc<MediaService>>,
) -> Result<Json<SignatureResponseDto>, AppError> {
    Ok(Json(service.sign_upload()?))
}
