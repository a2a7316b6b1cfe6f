//! Cloudinary media-management client
//!
//! Signed uploads, Admin API listing per user folder, and request signing for
//! client-side direct uploads. Talks to the REST API with reqwest.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join;
use reqwest::{multipart, Client, Response};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};

use super::types::{
    extension_of, MediaType, StorageError, StorageKind, StoredObject, UploadObject,
};
use super::StorageBackend;
use crate::core::config::CloudinaryConfig;

/// Resource as returned by the upload and Admin APIs
#[derive(Debug, Deserialize)]
struct CloudinaryResource {
    public_id: String,
    secure_url: String,
    #[serde(default)]
    bytes: u64,
    created_at: String,
    format: Option<String>,
    filename: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(default)]
    resources: Vec<CloudinaryResource>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    message: String,
}

/// Credentials a client needs for a direct upload
#[derive(Debug, Clone)]
pub struct UploadSignature {
    pub timestamp: i64,
    pub signature: String,
    pub cloud_name: String,
    pub api_key: String,
}

/// Cloudinary REST client
pub struct CloudinaryClient {
    config: CloudinaryConfig,
    http_client: Client,
}

impl CloudinaryClient {
    pub fn new(config: CloudinaryConfig) -> Result<Self, StorageError> {
        let http_client = Client::builder().build().map_err(|e| {
            StorageError::Configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        info!(
            "Cloudinary client initialized for cloud: {}, folder: {}",
            config.cloud_name, config.folder
        );

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Folder holding one user's resources
    pub fn user_folder(&self, user_id: &str) -> String {
        format!("{}/{}", self.config.folder, user_id)
    }

    /// Admin API listing prefix, slash-terminated so `u1` never matches `u10`
    pub fn user_prefix(&self, user_id: &str) -> String {
        format!("{}/", self.user_folder(user_id))
    }

    /// Cloudinary request signature
    ///
    /// SHA-1 hex of the parameters sorted by name, joined as `k=v` with `&`,
    /// followed by the API secret.
    pub fn sign_params(&self, params: &BTreeMap<&str, String>) -> String {
        let to_sign = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha1::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.config.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Signature over a bare timestamp, for client-side direct uploads
    pub fn sign_upload(&self, timestamp: i64) -> UploadSignature {
        let mut params = BTreeMap::new();
        params.insert("timestamp", timestamp.to_string());

        UploadSignature {
            timestamp,
            signature: self.sign_params(&params),
            cloud_name: self.config.cloud_name.clone(),
            api_key: self.config.api_key.clone(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "{}/v1_1/{}/{}",
            self.config.api_base_url, self.config.cloud_name, path
        )
    }

    async fn list_resource_type(
        &self,
        resource_type: &str,
        user_id: &str,
    ) -> Result<Vec<CloudinaryResource>, StorageError> {
        let url = self.api_url(&format!("resources/{}/upload", resource_type));
        let prefix = self.user_prefix(user_id);
        let max_results = self.config.max_results.to_string();

        let response = self
            .http_client
            .get(&url)
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .query(&[
                ("prefix", prefix.as_str()),
                ("max_results", max_results.as_str()),
            ])
            .send()
            .await?;

        let list: ResourceList = parse_response(response).await?;
        debug!(
            "Cloudinary returned {} {} resources under '{}'",
            list.resources.len(),
            resource_type,
            prefix
        );
        Ok(list.resources)
    }
}

#[async_trait]
impl StorageBackend for CloudinaryClient {
    fn kind(&self) -> StorageKind {
        StorageKind::Cloudinary
    }

    async fn upload(&self, object: UploadObject) -> Result<StoredObject, StorageError> {
        let media_type = MediaType::from_mime(&object.content_type);
        let resource_type = match media_type {
            MediaType::Video => "video",
            _ => "image",
        };

        let public_id = match object.storage_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => object.storage_name.clone(),
        };
        let timestamp = Utc::now().timestamp();

        let mut params = BTreeMap::new();
        params.insert("folder", self.user_folder(&object.user_id));
        params.insert("public_id", public_id);
        params.insert("timestamp", timestamp.to_string());
        let signature = self.sign_params(&params);

        let file_part = multipart::Part::bytes(object.data.to_vec())
            .file_name(object.storage_name.clone())
            .mime_str(&object.content_type)?;

        let mut form = multipart::Form::new()
            .part("file", file_part)
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature);
        for (key, value) in params {
            form = form.text(key, value);
        }

        let url = self.api_url(&format!("{}/upload", resource_type));
        let response = self.http_client.post(&url).multipart(form).send().await?;
        let resource: CloudinaryResource = parse_response(response).await?;

        debug!("Uploaded resource '{}' to Cloudinary", resource.public_id);

        stored_object_from_resource(resource, media_type, Some(object.original_name))
    }

    async fn list(&self, user_id: &str) -> Result<Vec<StoredObject>, StorageError> {
        let (images, videos) = join(
            self.list_resource_type("image", user_id),
            self.list_resource_type("video", user_id),
        )
        .await;

        merge_resource_lists(images, videos)
    }
}

/// Normalize image and video listings into one list
///
/// One failing resource type is logged and skipped; only when both fail is
/// the listing an error.
fn merge_resource_lists(
    images: Result<Vec<CloudinaryResource>, StorageError>,
    videos: Result<Vec<CloudinaryResource>, StorageError>,
) -> Result<Vec<StoredObject>, StorageError> {
    let (images, videos) = match (images, videos) {
        (Ok(images), Ok(videos)) => (images, videos),
        (Ok(images), Err(e)) => {
            warn!("Cloudinary video listing failed, keeping images: {}", e);
            (images, Vec::new())
        }
        (Err(e), Ok(videos)) => {
            warn!("Cloudinary image listing failed, keeping videos: {}", e);
            (Vec::new(), videos)
        }
        (Err(e), Err(_)) => return Err(e),
    };

    let objects = images
        .into_iter()
        .map(|r| (r, MediaType::Image))
        .chain(videos.into_iter().map(|r| (r, MediaType::Video)))
        .filter_map(|(resource, media_type)| {
            let public_id = resource.public_id.clone();
            match stored_object_from_resource(resource, media_type, None) {
                Ok(object) => Some(object),
                Err(e) => {
                    warn!("Skipping Cloudinary resource '{}': {}", public_id, e);
                    None
                }
            }
        })
        .collect();

    Ok(objects)
}

/// Decode a successful JSON body or turn Cloudinary's error envelope into
/// a `StorageError::Response`
async fn parse_response<T: serde::de::DeserializeOwned>(
    response: Response,
) -> Result<T, StorageError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        return Err(StorageError::Response {
            status: status.as_u16(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| StorageError::InvalidResponse(e.to_string()))
}

fn stored_object_from_resource(
    resource: CloudinaryResource,
    media_type: MediaType,
    original_name: Option<String>,
) -> Result<StoredObject, StorageError> {
    let uploaded_at = DateTime::parse_from_rfc3339(&resource.created_at)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            StorageError::InvalidResponse(format!(
                "invalid created_at '{}': {}",
                resource.created_at, e
            ))
        })?;

    let original_name = original_name
        .or(resource.filename)
        .or(resource.display_name)
        .unwrap_or_else(|| {
            resource
                .public_id
                .rsplit('/')
                .next()
                .unwrap_or(&resource.public_id)
                .to_string()
        });

    let format = resource
        .format
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| extension_of(&original_name));

    Ok(StoredObject {
        id: resource.public_id,
        url: resource.secure_url,
        original_name,
        size: resource.bytes,
        media_type,
        uploaded_at,
        format,
        storage: StorageKind::Cloudinary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CloudinaryClient {
        CloudinaryClient::new(CloudinaryConfig {
            cloud_name: "demo".to_string(),
            api_key: "1234".to_string(),
            api_secret: "abcd".to_string(),
            folder: "photo-uploader".to_string(),
            max_results: 100,
            api_base_url: "https://api.cloudinary.com".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_sign_params_matches_sha1_of_canonical_string() {
        let client = client();
        let mut params = BTreeMap::new();
        params.insert("timestamp", "1315060510".to_string());
        params.insert("public_id", "sample_image".to_string());

        let mut hasher = Sha1::new();
        hasher.update(b"public_id=sample_image&timestamp=1315060510abcd");
        let expected = hex::encode(hasher.finalize());

        assert_eq!(client.sign_params(&params), expected);
    }

    #[test]
    fn test_sign_upload_returns_public_credentials() {
        let signed = client().sign_upload(1_700_000_000);

        assert_eq!(signed.timestamp, 1_700_000_000);
        assert_eq!(signed.cloud_name, "demo");
        assert_eq!(signed.api_key, "1234");
        assert_eq!(signed.signature.len(), 40);
        assert!(signed.signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(signed.signature, client().sign_upload(1_700_000_001).signature);
    }

    #[test]
    fn test_user_folder() {
        assert_eq!(client().user_folder("u1"), "photo-uploader/u1");
    }

    #[test]
    fn test_user_prefix_does_not_match_longer_ids() {
        let prefix = client().user_prefix("u1");
        assert_eq!(prefix, "photo-uploader/u1/");
        assert!("photo-uploader/u1/beach".starts_with(&prefix));
        assert!(!"photo-uploader/u10/beach".starts_with(&prefix));
        assert!(!"photo-uploader/u1x/beach".starts_with(&prefix));
    }

    fn resource(public_id: &str) -> CloudinaryResource {
        CloudinaryResource {
            public_id: public_id.to_string(),
            secure_url: format!("https://res.cloudinary.com/demo/{}", public_id),
            bytes: 10,
            created_at: "2024-03-01T10:00:00Z".to_string(),
            format: None,
            filename: None,
            display_name: None,
        }
    }

    fn failure() -> StorageError {
        StorageError::Response {
            status: 420,
            message: "Rate Limit Exceeded".to_string(),
        }
    }

    #[test]
    fn test_merge_keeps_images_when_videos_fail() {
        let merged = merge_resource_lists(Ok(vec![resource("f/u1/a")]), Err(failure())).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, "f/u1/a");
        assert_eq!(merged[0].media_type, MediaType::Image);
    }

    #[test]
    fn test_merge_keeps_videos_when_images_fail() {
        let merged = merge_resource_lists(Err(failure()), Ok(vec![resource("f/u1/v")])).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].media_type, MediaType::Video);
    }

    #[test]
    fn test_merge_fails_when_both_fail() {
        let merged = merge_resource_lists(Err(failure()), Err(failure()));
        assert!(matches!(
            merged,
            Err(StorageError::Response { status: 420, .. })
        ));
    }

    #[test]
    fn test_merge_combines_both_types() {
        let merged = merge_resource_lists(
            Ok(vec![resource("f/u1/a"), resource("f/u1/b")]),
            Ok(vec![resource("f/u1/v")]),
        )
        .unwrap();
        let kinds: Vec<MediaType> = merged.iter().map(|o| o.media_type).collect();
        assert_eq!(
            kinds,
            vec![MediaType::Image, MediaType::Image, MediaType::Video]
        );
    }

    #[test]
    fn test_listed_resource_name_fallbacks() {
        let list: ResourceList = serde_json::from_str(
            r#"{
                "resources": [
                    {
                        "public_id": "photo-uploader/u1/beach",
                        "secure_url": "https://res.cloudinary.com/demo/image/upload/beach.jpg",
                        "bytes": 1200,
                        "created_at": "2024-03-01T10:00:00Z",
                        "format": "jpg",
                        "display_name": "Beach day"
                    },
                    {
                        "public_id": "photo-uploader/u1/clip",
                        "secure_url": "https://res.cloudinary.com/demo/video/upload/clip.mp4",
                        "created_at": "2024-03-02T10:00:00Z",
                        "format": "mp4"
                    }
                ]
            }"#,
        )
        .unwrap();

        let mut resources = list.resources.into_iter();
        let beach =
            stored_object_from_resource(resources.next().unwrap(), MediaType::Image, None).unwrap();
        assert_eq!(beach.original_name, "Beach day");
        assert_eq!(beach.size, 1200);
        assert_eq!(beach.format, "jpg");
        assert_eq!(beach.storage, StorageKind::Cloudinary);

        let clip =
            stored_object_from_resource(resources.next().unwrap(), MediaType::Video, None).unwrap();
        assert_eq!(clip.original_name, "clip");
        assert_eq!(clip.size, 0);
        assert_eq!(clip.media_type, MediaType::Video);
    }

    #[test]
    fn test_resource_with_bad_timestamp_is_rejected() {
        let resource = CloudinaryResource {
            public_id: "p".to_string(),
            secure_url: "https://x".to_string(),
            bytes: 1,
            created_at: "not-a-date".to_string(),
            format: None,
            filename: None,
            display_name: None,
        };
        assert!(stored_object_from_resource(resource, MediaType::Image, None).is_err());
    }
}
