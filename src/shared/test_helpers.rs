#[cfg(test)]
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};

#[cfg(test)]
use async_trait::async_trait;

#[cfg(test)]
use crate::modules::storage::{
    MediaType, StorageBackend, StorageError, StorageKind, StoredObject, UploadObject,
};

#[cfg(test)]
fn format_of(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Build a stored object with the given id and RFC 3339 upload date
#[cfg(test)]
pub fn stored_object(storage: StorageKind, id: &str, uploaded_at: &str) -> StoredObject {
    let name = id.rsplit('/').next().unwrap_or(id).to_string();
    StoredObject {
        id: id.to_string(),
        url: format!("https://media.test/{}", id),
        format: format_of(&name),
        original_name: name,
        size: 1,
        media_type: MediaType::Image,
        uploaded_at: uploaded_at.parse().unwrap(),
        storage,
    }
}

/// In-memory storage backend that records what it is asked to do
#[cfg(test)]
pub struct FakeBackend {
    kind: StorageKind,
    objects: Vec<StoredObject>,
    failure: Option<String>,
    uploads: AtomicUsize,
    last_upload: Mutex<Option<UploadObject>>,
    listed_users: Mutex<Vec<String>>,
}

#[cfg(test)]
impl FakeBackend {
    pub fn new(kind: StorageKind) -> Self {
        Self {
            kind,
            objects: Vec::new(),
            failure: None,
            uploads: AtomicUsize::new(0),
            last_upload: Mutex::new(None),
            listed_users: Mutex::new(Vec::new()),
        }
    }

    /// A backend whose every call fails with `message`
    pub fn failing(kind: StorageKind, message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(kind)
        }
    }

    pub fn with_objects(mut self, objects: Vec<StoredObject>) -> Self {
        self.objects = objects;
        self
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn last_upload(&self) -> Option<UploadObject> {
        self.last_upload.lock().unwrap().clone()
    }

    pub fn listed_users(&self) -> Vec<String> {
        self.listed_users.lock().unwrap().clone()
    }

    fn check_failure(&self) -> Result<(), StorageError> {
        match &self.failure {
            Some(message) => Err(StorageError::Request(message.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl StorageBackend for FakeBackend {
    fn kind(&self) -> StorageKind {
        self.kind
    }

    async fn upload(&self, object: UploadObject) -> Result<StoredObject, StorageError> {
        self.check_failure()?;
        self.uploads.fetch_add(1, Ordering::SeqCst);

        let stored = StoredObject {
            id: format!("{}/{}", object.user_id, object.storage_name),
            url: format!("https://media.test/{}/{}", object.user_id, object.storage_name),
            original_name: object.original_name.clone(),
            size: object.data.len() as u64,
            media_type: MediaType::from_mime(&object.content_type),
            uploaded_at: chrono::Utc::now(),
            format: format_of(&object.original_name),
            storage: self.kind,
        };
        *self.last_upload.lock().unwrap() = Some(object);
        Ok(stored)
    }

    async fn list(&self, user_id: &str) -> Result<Vec<StoredObject>, StorageError> {
        self.listed_users.lock().unwrap().push(user_id.to_string());
        self.check_failure()?;
        Ok(self.objects.clone())
    }
}
