//! HTTP client for the enhancement provider's REST API.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::presigned::presigned_upload_headers;
use super::types::{
    DownloadOptions, EnhancementProvider, ProcessRequest, ProviderBracket, ProviderError,
    ProviderImage, ProviderOrder,
};
use crate::config::ProviderConfig;
use crate::metrics::observe_external;

/// Provider client. All calls authenticate with the API key as a bearer
/// token and live under `<base_url>/api/v1`.
pub struct HttpProvider {
    client: Client,
    /// Separate client for pre-signed PUTs. No default auth, longer budget.
    upload_client: Client,
    base_url: String,
    api_key: String,
}

/// Listing endpoints answer either with a bare array or an envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum BracketList {
    Bare(Vec<ProviderBracket>),
    Wrapped { brackets: Vec<ProviderBracket> },
}

impl HttpProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::Transport(
                "provider API key is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()?;

        let upload_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64 * 4))
            .build()?;

        Ok(Self {
            client,
            upload_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(&self.api_key)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(&self.api_key)
    }

    /// Send a request, timing it and mapping non-2xx statuses.
    async fn send(
        &self,
        operation: &str,
        resource: &str,
        request: RequestBuilder,
    ) -> Result<Response, ProviderError> {
        let start = Instant::now();
        let result = match request.send().await {
            Ok(response) => check_status(response, resource).await,
            Err(e) => Err(ProviderError::from(e)),
        };
        observe_external(
            "provider",
            operation,
            result.is_ok(),
            start.elapsed().as_secs_f64(),
        );
        result
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        resource: &str,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = self.send(operation, resource, request).await?;
        response.json::<T>().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("failed to decode {}: {}", operation, e))
        })
    }

    async fn send_bytes(
        &self,
        operation: &str,
        resource: &str,
        request: RequestBuilder,
    ) -> Result<Vec<u8>, ProviderError> {
        let response = self.send(operation, resource, request).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

async fn check_status(response: Response, resource: &str) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == 404 {
        return Err(ProviderError::NotFound(resource.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Api {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl EnhancementProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn create_order(&self, name: Option<&str>) -> Result<ProviderOrder, ProviderError> {
        debug!(name = ?name, "Creating provider order");
        let body = match name {
            Some(n) => json!({ "name": n }),
            None => json!({}),
        };
        self.send_json("create_order", "order", self.post("/orders").json(&body))
            .await
    }

    async fn get_order(&self, order_id: &str) -> Result<ProviderOrder, ProviderError> {
        let path = format!("/orders/{}", order_id);
        self.send_json("get_order", &format!("order {}", order_id), self.get(&path))
            .await
    }

    async fn delete_order(&self, order_id: &str) -> Result<(), ProviderError> {
        let request = self
            .client
            .delete(self.url(&format!("/orders/{}", order_id)))
            .bearer_auth(&self.api_key);
        self.send("delete_order", &format!("order {}", order_id), request)
            .await?;
        Ok(())
    }

    async fn create_bracket(
        &self,
        order_id: &str,
        name: &str,
    ) -> Result<ProviderBracket, ProviderError> {
        debug!(order_id, name, "Creating provider bracket");
        let body = json!({ "order_id": order_id, "name": name });
        let bracket: ProviderBracket = self
            .send_json("create_bracket", "bracket", self.post("/brackets").json(&body))
            .await?;
        if bracket.upload_url.as_deref().is_none_or(str::is_empty) {
            return Err(ProviderError::InvalidResponse(format!(
                "bracket {} has no upload URL",
                bracket.bracket_id
            )));
        }
        Ok(bracket)
    }

    async fn get_bracket(&self, bracket_id: &str) -> Result<ProviderBracket, ProviderError> {
        let path = format!("/brackets/{}", bracket_id);
        self.send_json(
            "get_bracket",
            &format!("bracket {}", bracket_id),
            self.get(&path),
        )
        .await
    }

    async fn get_order_brackets(
        &self,
        order_id: &str,
    ) -> Result<Vec<ProviderBracket>, ProviderError> {
        let path = format!("/orders/{}/brackets", order_id);
        let list: BracketList = self
            .send_json(
                "get_order_brackets",
                &format!("order {}", order_id),
                self.get(&path),
            )
            .await?;
        Ok(match list {
            BracketList::Bare(v) => v,
            BracketList::Wrapped { brackets } => brackets,
        })
    }

    async fn upload_blob(
        &self,
        upload_url: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), ProviderError> {
        let mut request = self.upload_client.put(upload_url).body(bytes.to_vec());
        for (name, value) in presigned_upload_headers(upload_url, content_type) {
            request = request.header(name, value);
        }
        self.send("upload_blob", "upload url", request).await?;
        Ok(())
    }

    async fn process_order(
        &self,
        order_id: &str,
        request: &ProcessRequest,
    ) -> Result<ProviderOrder, ProviderError> {
        debug!(order_id, groups = request.images.len(), "Submitting order");
        let path = format!("/orders/{}/process", order_id);
        self.send_json(
            "process_order",
            &format!("order {}", order_id),
            self.post(&path).json(request),
        )
        .await
    }

    async fn get_image(&self, image_id: &str) -> Result<ProviderImage, ProviderError> {
        let path = format!("/images/{}", image_id);
        self.send_json("get_image", &format!("image {}", image_id), self.get(&path))
            .await
    }

    async fn download_enhanced(
        &self,
        image_id: &str,
        options: &DownloadOptions,
    ) -> Result<Vec<u8>, ProviderError> {
        let path = format!("/images/{}/download", image_id);
        self.send_bytes(
            "download_enhanced",
            &format!("image {}", image_id),
            self.get(&path).query(&options.query_pairs()),
        )
        .await
    }

    async fn download_original(
        &self,
        image_id: &str,
        options: &DownloadOptions,
    ) -> Result<Vec<u8>, ProviderError> {
        let path = format!("/images/{}/original", image_id);
        self.send_bytes(
            "download_original",
            &format!("image {}", image_id),
            self.get(&path).query(&options.query_pairs()),
        )
        .await
    }
}
