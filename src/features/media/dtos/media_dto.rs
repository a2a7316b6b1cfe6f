use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::modules::storage::{MediaType, StorageKind, StoredObject, UploadSignature};

/// Form field carrying the uploaded file
pub const FILE_FIELD: &str = "file";

/// Optional form field naming the owner of the upload
pub const USER_ID_FIELD: &str = "userId";

/// MIME type prefixes accepted for upload
pub const ALLOWED_MEDIA_PREFIXES: &[&str] = &["image/", "video/"];

/// Check if a MIME type is an image or a video
pub fn is_media_type_allowed(mime_type: &str) -> bool {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    ALLOWED_MEDIA_PREFIXES
        .iter()
        .any(|prefix| mime_type.starts_with(prefix))
}

/// Normalized description of one stored media object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaDescriptor {
    /// Backend-unique identifier (S3 key or Cloudinary public id)
    pub id: String,
    /// URL the media can be fetched from
    pub url: String,
    /// Filename as uploaded
    pub original_name: String,
    /// Size in bytes
    #[serde(rename = "size")]
    pub size_bytes: u64,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    #[serde(rename = "uploadDate")]
    pub uploaded_at: DateTime<Utc>,
    /// File extension
    pub format: String,
    pub storage: StorageKind,
}

impl From<StoredObject> for MediaDescriptor {
    fn from(object: StoredObject) -> Self {
        Self {
            id: object.id,
            url: object.url,
            original_name: object.original_name,
            size_bytes: object.size,
            media_type: object.media_type,
            uploaded_at: object.uploaded_at,
            format: object.format,
            storage: object.storage,
        }
    }
}

/// Upload media request DTO for OpenAPI documentation
/// Note: This struct is for Swagger UI documentation only.
/// The actual handler decodes the body with the `FormData` extractor.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct UploadMediaDto {
    /// The image or video to upload
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// Owner of the upload, defaults to the configured placeholder user
    #[schema(example = "user-123")]
    pub user_id: Option<String>,
}

/// Query parameters for listing a user's media
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListMediaQuery {
    /// Owner whose media should be listed
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

impl ListMediaQuery {
    /// The user id, if present and not blank
    pub fn user_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Merged listing across every configured backend
#[derive(Debug, Clone)]
pub struct MediaListing {
    /// Sorted by upload date, newest first
    pub items: Vec<MediaDescriptor>,
    /// Number of items contributed by each backend
    pub sources: BTreeMap<String, usize>,
}

/// Signed parameters for a direct client upload to Cloudinary
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignatureResponseDto {
    /// Unix timestamp (seconds) covered by the signature
    pub timestamp: i64,
    pub signature: String,
    pub cloud_name: String,
    pub api_key: String,
}

impl From<UploadSignature> for SignatureResponseDto {
    fn from(signed: UploadSignature) -> Self {
        Self {
            timestamp: signed.timestamp,
            signature: signed.signature,
            cloud_name: signed.cloud_name,
            api_key: signed.api_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_media_type_allowed() {
        assert!(is_media_type_allowed("image/png"));
        assert!(is_media_type_allowed("video/quicktime"));
        assert!(is_media_type_allowed("IMAGE/JPEG"));
        assert!(!is_media_type_allowed("text/plain"));
        assert!(!is_media_type_allowed("application/pdf"));
        assert!(!is_media_type_allowed("imagex/png"));
    }

    #[test]
    fn test_descriptor_wire_format() {
        let descriptor = MediaDescriptor {
            id: "memories-to-cloud/u1/a.png".to_string(),
            url: "https://example.com/a.png".to_string(),
            original_name: "a.png".to_string(),
            size_bytes: 10,
            media_type: MediaType::Image,
            uploaded_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            format: "png".to_string(),
            storage: StorageKind::S3,
        };

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["originalName"], "a.png");
        assert_eq!(json["size"], 10);
        assert_eq!(json["type"], "image");
        assert_eq!(json["uploadDate"], "2024-01-01T00:00:00Z");
        assert_eq!(json["storage"], "aws-s3");
    }

    #[test]
    fn test_list_query_user_id_ignores_blank() {
        let query = ListMediaQuery {
            user_id: Some("   ".to_string()),
        };
        assert_eq!(query.user_id(), None);

        let query = ListMediaQuery {
            user_id: Some(" u1 ".to_string()),
        };
        assert_eq!(query.user_id(), Some("u1"));
    }
}
