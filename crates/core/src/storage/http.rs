//! Storage REST API client (`<url>/storage/v1`).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use super::traits::{object_path, order_prefix, ObjectStore, StorageError, StoredObject};
use crate::config::StorageConfig;
use crate::metrics::observe_external;

/// Page size for prefix listings.
const LIST_PAGE: usize = 1000;

pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    bucket: String,
    key: String,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
}

impl HttpObjectStore {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/storage/v1", config.url.trim_end_matches('/')),
            bucket: config.bucket.clone(),
            key: config.active_key().to_string(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.key)
            .header("apikey", &self.key)
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response, StorageError> {
        let start = Instant::now();
        let result = match self.authorized(request).send().await {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                Err(StorageError::Api { status, body })
            }
            Err(e) => Err(StorageError::from(e)),
        };
        observe_external(
            "storage",
            operation,
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );
        result
    }

    /// Names of every object directly under `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let url = format!("{}/object/list/{}", self.base_url, self.bucket);
        let mut names = Vec::new();
        let mut offset = 0;

        loop {
            let body = json!({ "prefix": prefix, "limit": LIST_PAGE, "offset": offset });
            let response = self.send("list", self.client.post(&url).json(&body)).await?;
            let page: Vec<ListedObject> = response.json().await?;
            let count = page.len();
            names.extend(page.into_iter().map(|o| format!("{}/{}", prefix, o.name)));

            if count < LIST_PAGE {
                return Ok(names);
            }
            offset += count;
        }
    }

    async fn remove(&self, paths: &[String]) -> Result<(), StorageError> {
        let url = format!("{}/object/{}", self.base_url, self.bucket);
        self.send(
            "delete",
            self.client.delete(&url).json(&json!({ "prefixes": paths })),
        )
        .await?;
        Ok(())
    }
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        filename: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let storage_path = object_path(user_id, order_id, filename)?;
        let url = format!(
            "{}/object/{}/{}",
            self.base_url,
            self.bucket,
            encode_path(&storage_path)
        );

        debug!(path = %storage_path, size = bytes.len(), "Uploading object");

        let request = self
            .client
            .post(&url)
            .header("x-upsert", "true")
            .header("Content-Type", content_type)
            .body(bytes);
        self.send("upload", request).await?;

        Ok(StoredObject {
            public_url: self.public_url(&storage_path),
            storage_path,
        })
    }

    fn public_url(&self, storage_path: &str) -> String {
        format!(
            "{}/object/public/{}/{}",
            self.base_url,
            self.bucket,
            encode_path(storage_path)
        )
    }

    async fn delete_order_prefix(
        &self,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<usize, StorageError> {
        let prefix = order_prefix(user_id, order_id);
        let paths = self.list(&prefix).await?;
        if paths.is_empty() {
            return Ok(0);
        }

        for chunk in paths.chunks(LIST_PAGE) {
            self.remove(chunk).await?;
        }

        info!(prefix = %prefix, count = paths.len(), "Deleted order objects");
        Ok(paths.len())
    }

    async fn delete(&self, storage_path: &str) -> Result<(), StorageError> {
        self.remove(&[storage_path.to_string()]).await
    }
}
