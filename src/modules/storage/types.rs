use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "svg"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "wmv", "flv", "webm", "mkv"];

/// Storage provider holding a media object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum StorageKind {
    #[serde(rename = "aws-s3")]
    S3,
    #[serde(rename = "cloudinary")]
    Cloudinary,
}

impl StorageKind {
    /// Key used for this backend in listing `sources` breakdowns
    pub fn source_key(&self) -> &'static str {
        match self {
            StorageKind::S3 => "s3",
            StorageKind::Cloudinary => "cloudinary",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::S3 => "aws-s3",
            StorageKind::Cloudinary => "cloudinary",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s3" | "aws-s3" => Ok(StorageKind::S3),
            "cloudinary" => Ok(StorageKind::Cloudinary),
            other => Err(format!(
                "Unknown storage backend '{}', expected 's3' or 'cloudinary'",
                other
            )),
        }
    }
}

/// Coarse media classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Unknown,
}

impl MediaType {
    /// Classify a MIME type such as `image/png`
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            MediaType::Image
        } else if mime.starts_with("video/") {
            MediaType::Video
        } else {
            MediaType::Unknown
        }
    }

    /// Classify a lowercase file extension without the leading dot
    pub fn from_extension(extension: &str) -> Self {
        if IMAGE_EXTENSIONS.contains(&extension) {
            MediaType::Image
        } else if VIDEO_EXTENSIONS.contains(&extension) {
            MediaType::Video
        } else {
            MediaType::Unknown
        }
    }
}

/// An object to be written into a user's namespace
#[derive(Debug, Clone)]
pub struct UploadObject {
    /// Encoded user namespace, see `shared::validation::user_namespace`
    pub user_id: String,
    /// Collision-resistant storage name (`{millis}_{id}_{sanitized}`)
    pub storage_name: String,
    /// Filename exactly as the client sent it
    pub original_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// An object as reported by a backend, already normalized
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub id: String,
    pub url: String,
    pub original_name: String,
    pub size: u64,
    pub media_type: MediaType,
    pub uploaded_at: DateTime<Utc>,
    pub format: String,
    pub storage: StorageKind,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0}")]
    Configuration(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Backend responded with status {status}: {message}")]
    Response { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        StorageError::Request(e.to_string())
    }
}

impl From<s3::error::S3Error> for StorageError {
    fn from(e: s3::error::S3Error) -> Self {
        StorageError::Request(e.to_string())
    }
}

/// Lowercased extension of the last path segment, empty when there is none
pub fn extension_of(name: &str) -> String {
    let file_name = name.rsplit('/').next().unwrap_or(name);
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
        _ => String::new(),
    }
}
