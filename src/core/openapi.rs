use utoipa::{Modify, OpenApi};

use crate::features::media::{dtos as media_dtos, handlers as media_handlers};
use crate::modules::storage::{MediaType, StorageKind};
use crate::shared::types::{ApiResponse, ErrorResponse};

#[derive(OpenApi)]
#[openapi(
    paths(
        media_handlers::upload_media,
        media_handlers::list_media,
        media_handlers::sign_upload,
    ),
    components(
        schemas(
            // Shared
            ErrorResponse,
            StorageKind,
            MediaType,
            // Media
            media_dtos::MediaDescriptor,
            media_dtos::UploadMediaDto,
            media_dtos::SignatureResponseDto,
            ApiResponse<media_dtos::MediaDescriptor>,
            ApiResponse<Vec<media_dtos::MediaDescriptor>>,
        )
    ),
    tags(
        (name = "media", description = "Photo and video upload, listing and direct-upload signatures"),
    ),
    info(
        title = "Memories to Cloud API",
        version = "0.1.0",
        description = "Upload photos and videos to S3 or Cloudinary and list them per user",
    )
)]
pub struct ApiDoc;

/// Modifier to override OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}
