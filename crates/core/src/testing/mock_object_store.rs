//! Mock object store for testing.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::storage::{object_path, order_prefix, ObjectStore, StorageError, StoredObject};

const PUBLIC_BASE: &str = "https://storage.mock/public";

/// A blob held by the mock store.
#[derive(Debug, Clone, PartialEq)]
pub struct MockBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// In-memory implementation of the ObjectStore trait.
///
/// Public URLs resolve back to stored bytes through [`MockObjectStore::fetch`].
#[derive(Debug)]
pub struct MockObjectStore {
    objects: Arc<RwLock<BTreeMap<String, MockBlob>>>,
    next_error: Arc<RwLock<Option<StorageError>>>,
    fail_uploads: Arc<RwLock<bool>>,
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            next_error: Arc::new(RwLock::new(None)),
            fail_uploads: Arc::new(RwLock::new(false)),
        }
    }

    /// Make the next operation fail with this error.
    pub async fn set_next_error(&self, error: StorageError) {
        *self.next_error.write().await = Some(error);
    }

    /// Fail every upload until reset.
    pub async fn set_fail_uploads(&self, fail: bool) {
        *self.fail_uploads.write().await = fail;
    }

    /// All stored paths, sorted.
    pub async fn paths(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    pub async fn get(&self, storage_path: &str) -> Option<MockBlob> {
        self.objects.read().await.get(storage_path).cloned()
    }

    /// Resolve a public URL to its bytes, like an anonymous GET would.
    pub async fn fetch(&self, url: &str) -> Option<Vec<u8>> {
        let path = url.strip_prefix(PUBLIC_BASE)?.strip_prefix('/')?;
        self.objects.read().await.get(path).map(|b| b.bytes.clone())
    }

    async fn take_error(&self) -> Result<(), StorageError> {
        match self.next_error.write().await.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn upload(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        self.take_error().await?;
        if *self.fail_uploads.read().await {
            return Err(StorageError::Api {
                status: 500,
                body: "mock upload failure".to_string(),
            });
        }

        let path = object_path(user_id, order_id, filename)?;
        self.objects.write().await.insert(
            path.clone(),
            MockBlob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(StoredObject {
            public_url: self.public_url(&path),
            storage_path: path,
        })
    }

    fn public_url(&self, storage_path: &str) -> String {
        format!("{}/{}", PUBLIC_BASE, storage_path)
    }

    async fn delete_order_prefix(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<usize, StorageError> {
        self.take_error().await?;
        let prefix = format!("{}/", order_prefix(user_id, order_id));
        let mut objects = self.objects.write().await;
        let before = objects.len();
        objects.retain(|path, _| !path.starts_with(&prefix));
        Ok(before - objects.len())
    }

    async fn delete(&self, storage_path: &str) -> Result<(), StorageError> {
        self.take_error().await?;
        self.objects.write().await.remove(storage_path);
        Ok(())
    }
}
