use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::error::{AppError, Result};
use crate::features::media::dtos::{
    is_media_type_allowed, MediaDescriptor, MediaListing, SignatureResponseDto, FILE_FIELD,
    USER_ID_FIELD,
};
use crate::modules::storage::{CloudinaryClient, StorageBackend, StorageError, UploadObject};
use crate::shared::multipart::ParsedForm;
use crate::shared::validation::{sanitize_key_segment, user_namespace};

/// Result of a successful upload
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// User id exactly as supplied by the client
    pub user_id: String,
    pub media: MediaDescriptor,
}

/// Service for media uploads, listings and upload signatures
pub struct MediaService {
    upload_backend: Arc<dyn StorageBackend>,
    backends: Vec<Arc<dyn StorageBackend>>,
    signer: Option<Arc<CloudinaryClient>>,
    default_user_id: String,
    expose_debug_details: bool,
}

impl MediaService {
    /// `upload_backend` receives new uploads, `backends` are all queried on
    /// listing
    pub fn new(
        upload_backend: Arc<dyn StorageBackend>,
        backends: Vec<Arc<dyn StorageBackend>>,
        default_user_id: impl Into<String>,
    ) -> Self {
        Self {
            upload_backend,
            backends,
            signer: None,
            default_user_id: default_user_id.into(),
            expose_debug_details: false,
        }
    }

    /// Enable the direct-upload signature endpoint
    pub fn with_signer(mut self, signer: Arc<CloudinaryClient>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Include backend diagnostics in error responses
    pub fn with_debug_details(mut self, enabled: bool) -> Self {
        self.expose_debug_details = enabled;
        self
    }

    /// Validate a decoded form and store its file on the upload backend
    pub async fn upload(&self, mut form: ParsedForm) -> Result<UploadOutcome> {
        let file = form
            .files
            .remove(FILE_FIELD)
            .ok_or_else(|| AppError::MissingFile("No file was provided".to_string()))?;

        let user_id = form
            .fields
            .remove(USER_ID_FIELD)
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| self.default_user_id.clone());

        debug!(
            "Upload request: user={}, name={}, type={}, size={}",
            user_id, file.original_filename, file.mime_type, file.size_bytes
        );

        if !is_media_type_allowed(&file.mime_type) {
            return Err(AppError::UnsupportedMediaType(format!(
                "Only image and video files are supported, got '{}'",
                file.mime_type
            )));
        }

        let storage_name = storage_name(&file.original_filename, Utc::now());
        let backend = self.upload_backend.kind();

        let stored = self
            .upload_backend
            .upload(UploadObject {
                user_id: user_namespace(&user_id),
                storage_name,
                original_name: file.original_filename,
                content_type: file.mime_type,
                data: file.raw_bytes,
            })
            .await
            .map_err(|e| self.backend_error(format!("Failed to upload file to {}", backend), e))?;

        info!(
            "Uploaded '{}' for user {} to {} ({} bytes)",
            stored.id, user_id, backend, stored.size
        );

        Ok(UploadOutcome {
            user_id,
            media: stored.into(),
        })
    }

    /// List a user's media across every backend, newest first
    ///
    /// A failing backend is logged and contributes nothing.
    pub async fn list(&self, user_id: &str) -> Result<MediaListing> {
        let namespace = user_namespace(user_id);
        let namespace = namespace.as_str();

        let results = join_all(self.backends.iter().map(|backend| async move {
            (backend.kind(), backend.list(namespace).await)
        }))
        .await;

        let mut sources: BTreeMap<String, usize> = self
            .backends
            .iter()
            .map(|backend| (backend.kind().source_key().to_string(), 0))
            .collect();
        let mut seen = HashSet::new();
        let mut items = Vec::new();

        for (kind, result) in results {
            match result {
                Ok(objects) => {
                    for object in objects {
                        if !seen.insert(object.id.clone()) {
                            debug!("Dropping duplicate media id '{}' from {}", object.id, kind);
                            continue;
                        }
                        *sources.entry(kind.source_key().to_string()).or_default() += 1;
                        items.push(MediaDescriptor::from(object));
                    }
                }
                Err(e) => warn!("Listing media from {} failed for user {}: {}", kind, user_id, e),
            }
        }

        items.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));

        info!("Found {} media items for user {}", items.len(), user_id);
        Ok(MediaListing { items, sources })
    }

    /// Sign a timestamp so a client can upload straight to Cloudinary
    pub fn sign_upload(&self) -> Result<SignatureResponseDto> {
        let signer = self.signer.as_ref().ok_or_else(|| AppError::StorageBackend {
            message: "Direct uploads are not available".to_string(),
            details: "Cloudinary is not configured".to_string(),
            debug: None,
        })?;

        Ok(signer.sign_upload(Utc::now().timestamp()).into())
    }

    fn backend_error(&self, message: String, error: StorageError) -> AppError {
        AppError::StorageBackend {
            message,
            details: error.to_string(),
            debug: self.expose_debug_details.then(|| format!("{:?}", error)),
        }
    }
}

/// Collision-resistant storage name: `{unix_millis}_{8 hex}_{sanitized name}`
fn storage_name(original_name: &str, now: DateTime<Utc>) -> String {
    let short_id = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        now.timestamp_millis(),
        &short_id[..8],
        sanitize_key_segment(original_name)
    )
}
