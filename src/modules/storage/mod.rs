//! Storage module for media objects
//!
//! Provides the `StorageBackend` abstraction and its two implementations:
//! an S3-compatible bucket client and a Cloudinary client.

mod cloudinary_client;
mod s3_client;
mod types;

pub use cloudinary_client::{CloudinaryClient, UploadSignature};
pub use s3_client::S3Client;
pub use types::{MediaType, StorageError, StorageKind, StoredObject, UploadObject};

use async_trait::async_trait;

/// A remote store that can receive uploads and list a user's objects
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Which provider this backend talks to
    fn kind(&self) -> StorageKind;

    /// Store one object in the user's namespace
    async fn upload(&self, object: UploadObject) -> Result<StoredObject, StorageError>;

    /// List every object stored in the user's namespace
    async fn list(&self, user_id: &str) -> Result<Vec<StoredObject>, StorageError>;
}
