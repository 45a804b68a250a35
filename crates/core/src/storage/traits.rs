use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Errors from the object store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object store returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("object store request failed: {0}")]
    Transport(String),

    #[error("invalid object name: {0}")]
    InvalidName(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        StorageError::Transport(e.to_string())
    }
}

/// Where an uploaded blob ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub storage_path: String,
    pub public_url: String,
}

/// Prefix holding every blob of one order.
pub fn order_prefix(user_id: Uuid, order_id: Uuid) -> String {
    format!("users/{}/orders/{}", user_id, order_id)
}

/// Full storage path for a file of an order.
pub fn object_path(user_id: Uuid, order_id: Uuid, filename: &str) -> Result<String, StorageError> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename == "."
        || filename == ".."
    {
        return Err(StorageError::InvalidName(filename.to_string()));
    }
    Ok(format!("{}/{}", order_prefix(user_id, order_id), filename))
}

/// Blob storage keyed by user, order and filename.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload (or overwrite) a blob and return its path and public URL.
    async fn upload(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError>;

    /// Public URL for a storage path. Pure function of the path.
    fn public_url(&self, storage_path: &str) -> String;

    /// Remove every blob under the order's prefix. Returns the number removed.
    async fn delete_order_prefix(&self, user_id: Uuid, order_id: Uuid)
        -> Result<usize, StorageError>;

    /// Remove a single blob.
    async fn delete(&self, storage_path: &str) -> Result<(), StorageError>;
}
