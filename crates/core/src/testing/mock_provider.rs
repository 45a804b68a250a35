//! Mock enhancement provider for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::provider::{
    DownloadOptions, EnhancementProvider, ProcessRequest, ProviderBracket, ProviderError,
    ProviderImage, ProviderOrder,
};

/// A recorded provider call for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    CreateOrder { name: Option<String> },
    GetOrder { order_id: String },
    DeleteOrder { order_id: String },
    CreateBracket { order_id: String, name: String },
    GetBracket { bracket_id: String },
    GetOrderBrackets { order_id: String },
    UploadBlob { url: String, size: usize, content_type: String },
    ProcessOrder { order_id: String, request: ProcessRequest },
    GetImage { image_id: String },
    DownloadEnhanced { image_id: String, options: DownloadOptions },
    DownloadOriginal { image_id: String, options: DownloadOptions },
}

impl ProviderCall {
    /// Operation name, as used for failure rules.
    pub fn operation(&self) -> &'static str {
        match self {
            ProviderCall::CreateOrder { .. } => "create_order",
            ProviderCall::GetOrder { .. } => "get_order",
            ProviderCall::DeleteOrder { .. } => "delete_order",
            ProviderCall::CreateBracket { .. } => "create_bracket",
            ProviderCall::GetBracket { .. } => "get_bracket",
            ProviderCall::GetOrderBrackets { .. } => "get_order_brackets",
            ProviderCall::UploadBlob { .. } => "upload_blob",
            ProviderCall::ProcessOrder { .. } => "process_order",
            ProviderCall::GetImage { .. } => "get_image",
            ProviderCall::DownloadEnhanced { .. } => "download_enhanced",
            ProviderCall::DownloadOriginal { .. } => "download_original",
        }
    }

    /// The string failure rules match against.
    fn key(&self) -> String {
        match self {
            ProviderCall::CreateOrder { name } => name.clone().unwrap_or_default(),
            ProviderCall::GetOrder { order_id }
            | ProviderCall::DeleteOrder { order_id }
            | ProviderCall::GetOrderBrackets { order_id }
            | ProviderCall::ProcessOrder { order_id, .. } => order_id.clone(),
            ProviderCall::CreateBracket { name, .. } => name.clone(),
            ProviderCall::GetBracket { bracket_id } => bracket_id.clone(),
            ProviderCall::UploadBlob { url, .. } => url.clone(),
            ProviderCall::GetImage { image_id }
            | ProviderCall::DownloadEnhanced { image_id, .. }
            | ProviderCall::DownloadOriginal { image_id, .. } => image_id.clone(),
        }
    }
}

/// Fail calls of one operation whose key contains `pattern`.
#[derive(Debug, Clone)]
struct FailureRule {
    operation: String,
    pattern: String,
    /// `None` fails forever.
    remaining: Option<u32>,
    status: u16,
}

#[derive(Debug, Clone)]
struct MockBracketState {
    bracket: ProviderBracket,
    order_id: String,
}

/// Mock implementation of the EnhancementProvider trait.
///
/// Provides controllable behavior for testing:
/// - Orders get fresh UUIDs (or a queued id)
/// - Brackets become "uploaded" once their URL receives a PUT
/// - Images are added and completed explicitly by the test
/// - Failures can be injected per operation, per key, or for the next call
///
/// # Example
///
/// ```rust,ignore
/// let provider = MockProvider::new();
/// provider.fail_matching("upload_blob", "3.jpg", 500).await;
///
/// // ... run an upload ...
///
/// provider.add_image(&order_id, "img1", "completed").await;
/// provider.set_processing(&order_id, false).await;
/// ```
#[derive(Debug)]
pub struct MockProvider {
    orders: Arc<RwLock<HashMap<String, ProviderOrder>>>,
    brackets: Arc<RwLock<HashMap<String, MockBracketState>>>,
    /// Insertion order of bracket ids.
    bracket_order: Arc<RwLock<Vec<String>>>,
    calls: Arc<RwLock<Vec<ProviderCall>>>,
    next_error: Arc<RwLock<Option<ProviderError>>>,
    rules: Arc<RwLock<Vec<FailureRule>>>,
    queued_order_ids: Arc<RwLock<Vec<String>>>,
    bracket_counter: Arc<RwLock<u32>>,
    confirm_uploads: Arc<RwLock<bool>>,
    /// Artificial latency per operation.
    delays: Arc<RwLock<HashMap<String, Duration>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            orders: Arc::new(RwLock::new(HashMap::new())),
            brackets: Arc::new(RwLock::new(HashMap::new())),
            bracket_order: Arc::new(RwLock::new(Vec::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            rules: Arc::new(RwLock::new(Vec::new())),
            queued_order_ids: Arc::new(RwLock::new(Vec::new())),
            bracket_counter: Arc::new(RwLock::new(0)),
            confirm_uploads: Arc::new(RwLock::new(true)),
            delays: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    // =========================================================================
    // Control
    // =========================================================================

    /// Use this id for the next created order.
    pub async fn queue_order_id(&self, id: impl Into<String>) {
        self.queued_order_ids.write().await.push(id.into());
    }

    /// Make the next call (of any kind) fail with this error.
    pub async fn set_next_error(&self, error: ProviderError) {
        *self.next_error.write().await = Some(error);
    }

    /// Fail the next `times` calls of `operation` with HTTP `status`.
    pub async fn fail_times(&self, operation: &str, times: u32, status: u16) {
        self.rules.write().await.push(FailureRule {
            operation: operation.to_string(),
            pattern: String::new(),
            remaining: Some(times),
            status,
        });
    }

    /// Always fail calls of `operation` whose key contains `pattern`.
    ///
    /// Keys: order id, bracket name (create), bracket id (get), upload URL
    /// (which embeds the bracket name), image id.
    pub async fn fail_matching(&self, operation: &str, pattern: &str, status: u16) {
        self.rules.write().await.push(FailureRule {
            operation: operation.to_string(),
            pattern: pattern.to_string(),
            remaining: None,
            status,
        });
    }

    /// Delay every later call of `operation` by `delay` before it runs.
    pub async fn set_delay(&self, operation: &str, delay: Duration) {
        self.delays
            .write()
            .await
            .insert(operation.to_string(), delay);
    }

    pub async fn clear_failures(&self) {
        self.rules.write().await.clear();
        *self.next_error.write().await = None;
    }

    /// Whether `get_bracket` reports PUT brackets as uploaded (default true).
    pub async fn set_confirm_uploads(&self, confirm: bool) {
        *self.confirm_uploads.write().await = confirm;
    }

    /// Add (or replace) an image on an order. `total_images` never shrinks.
    pub async fn add_image(&self, order_id: &str, image_id: &str, status: &str) {
        let mut orders = self.orders.write().await;
        if let Some(order) = orders.get_mut(order_id) {
            order.images.retain(|i| i.image_id != image_id);
            order.images.push(ProviderImage {
                image_id: image_id.to_string(),
                status: Some(status.to_string()),
                status_reason: None,
                bracket_ids: Vec::new(),
            });
            let count = order.images.len() as i64;
            order.total_images = Some(order.total_images.map_or(count, |t| t.max(count)));
        }
    }

    /// Mark an image failed with a reason.
    pub async fn fail_image(&self, order_id: &str, image_id: &str, reason: &str) {
        let mut orders = self.orders.write().await;
        if let Some(image) = orders
            .get_mut(order_id)
            .and_then(|o| o.images.iter_mut().find(|i| i.image_id == image_id))
        {
            image.status = Some("failed".to_string());
            image.status_reason = Some(reason.to_string());
        }
    }

    pub async fn set_processing(&self, order_id: &str, processing: bool) {
        if let Some(order) = self.orders.write().await.get_mut(order_id) {
            order.is_processing = processing;
            order.status = Some(if processing { "processing" } else { "completed" }.to_string());
        }
    }

    pub async fn set_total_images(&self, order_id: &str, total: i64) {
        if let Some(order) = self.orders.write().await.get_mut(order_id) {
            order.total_images = Some(total);
        }
    }

    /// Assign a provider image id to a bracket.
    pub async fn set_bracket_image(&self, bracket_id: &str, image_id: &str) {
        if let Some(state) = self.brackets.write().await.get_mut(bracket_id) {
            state.bracket.image_id = Some(image_id.to_string());
        }
    }

    /// Drop a bracket from the provider's view.
    pub async fn forget_bracket(&self, bracket_id: &str) {
        self.brackets.write().await.remove(bracket_id);
        self.bracket_order.write().await.retain(|b| b != bracket_id);
    }

    /// Insert a provider-side order directly.
    pub async fn insert_order(&self, order: ProviderOrder) {
        self.orders
            .write()
            .await
            .insert(order.order_id.clone(), order);
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.calls.read().await.clone()
    }

    /// Number of recorded calls of one operation.
    pub async fn call_count(&self, operation: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    /// Every process request received, in order.
    pub async fn process_requests(&self) -> Vec<ProcessRequest> {
        self.calls
            .read()
            .await
            .iter()
            .filter_map(|c| match c {
                ProviderCall::ProcessOrder { request, .. } => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn has_order(&self, order_id: &str) -> bool {
        self.orders.read().await.contains_key(order_id)
    }

    /// Bracket ids of an order, in creation order.
    pub async fn bracket_ids(&self, order_id: &str) -> Vec<String> {
        let brackets = self.brackets.read().await;
        self.bracket_order
            .read()
            .await
            .iter()
            .filter(|id| brackets.get(*id).is_some_and(|b| b.order_id == order_id))
            .cloned()
            .collect()
    }

    /// Bytes served for an enhanced image at the given options.
    pub fn enhanced_bytes(image_id: &str, options: &DownloadOptions) -> Vec<u8> {
        format!(
            "enhanced:{}:{}:{}",
            image_id,
            options.max_width.map(|w| w.to_string()).unwrap_or_default(),
            options.watermark.unwrap_or(true)
        )
        .into_bytes()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Record the call and decide whether it fails.
    async fn enter(&self, call: ProviderCall) -> Result<(), ProviderError> {
        let operation = call.operation();
        let key = call.key();
        self.calls.write().await.push(call);

        let delay = self.delays.read().await.get(operation).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        let mut rules = self.rules.write().await;
        for rule in rules.iter_mut() {
            if rule.operation != operation || !key.contains(&rule.pattern) {
                continue;
            }
            match rule.remaining {
                Some(0) => continue,
                Some(ref mut n) => *n -= 1,
                None => {}
            }
            return Err(ProviderError::Api {
                status: rule.status,
                body: format!("mock failure for {} {}", operation, key),
            });
        }
        Ok(())
    }

    async fn order(&self, order_id: &str) -> Result<ProviderOrder, ProviderError> {
        self.orders
            .read()
            .await
            .get(order_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("order {}", order_id)))
    }

    async fn find_image(&self, image_id: &str) -> Result<ProviderImage, ProviderError> {
        self.orders
            .read()
            .await
            .values()
            .flat_map(|o| o.images.iter())
            .find(|i| i.image_id == image_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("image {}", image_id)))
    }
}

#[async_trait]
impl EnhancementProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_order(&self, name: Option<&str>) -> Result<ProviderOrder, ProviderError> {
        self.enter(ProviderCall::CreateOrder {
            name: name.map(str::to_string),
        })
        .await?;

        let id = {
            let mut queued = self.queued_order_ids.write().await;
            if queued.is_empty() {
                Uuid::new_v4().to_string()
            } else {
                queued.remove(0)
            }
        };

        let now = chrono::Utc::now();
        let order = ProviderOrder {
            order_id: id.clone(),
            name: name.map(str::to_string),
            status: Some("created".to_string()),
            is_processing: false,
            is_merging: false,
            is_deleted: false,
            total_images: None,
            created_at: Some(now),
            updated_at: Some(now),
            images: Vec::new(),
        };
        self.orders.write().await.insert(id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, order_id: &str) -> Result<ProviderOrder, ProviderError> {
        self.enter(ProviderCall::GetOrder {
            order_id: order_id.to_string(),
        })
        .await?;
        self.order(order_id).await
    }

    async fn delete_order(&self, order_id: &str) -> Result<(), ProviderError> {
        self.enter(ProviderCall::DeleteOrder {
            order_id: order_id.to_string(),
        })
        .await?;
        self.orders
            .write()
            .await
            .remove(order_id)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(format!("order {}", order_id)))
    }

    async fn create_bracket(
        &self,
        order_id: &str,
        name: &str,
    ) -> Result<ProviderBracket, ProviderError> {
        self.enter(ProviderCall::CreateBracket {
            order_id: order_id.to_string(),
            name: name.to_string(),
        })
        .await?;
        self.order(order_id).await?;

        let bracket_id = {
            let mut counter = self.bracket_counter.write().await;
            *counter += 1;
            format!("br-{:04}", *counter)
        };

        let bracket = ProviderBracket {
            bracket_id: bracket_id.clone(),
            name: Some(name.to_string()),
            upload_url: Some(format!(
                "https://uploads.mock/{}?name={}&X-Amz-Signature=sig",
                bracket_id,
                urlencoding::encode(name)
            )),
            is_uploaded: false,
            image_id: None,
            metadata: serde_json::json!({ "source": "mock" }),
        };

        self.brackets.write().await.insert(
            bracket_id.clone(),
            MockBracketState {
                bracket: bracket.clone(),
                order_id: order_id.to_string(),
            },
        );
        self.bracket_order.write().await.push(bracket_id);
        Ok(bracket)
    }

    async fn get_bracket(&self, bracket_id: &str) -> Result<ProviderBracket, ProviderError> {
        self.enter(ProviderCall::GetBracket {
            bracket_id: bracket_id.to_string(),
        })
        .await?;

        let confirm = *self.confirm_uploads.read().await;
        let mut bracket = self
            .brackets
            .read()
            .await
            .get(bracket_id)
            .map(|s| s.bracket.clone())
            .ok_or_else(|| ProviderError::NotFound(format!("bracket {}", bracket_id)))?;
        if !confirm {
            bracket.is_uploaded = false;
        }
        bracket.upload_url = None;
        Ok(bracket)
    }

    async fn get_order_brackets(
        &self,
        order_id: &str,
    ) -> Result<Vec<ProviderBracket>, ProviderError> {
        self.enter(ProviderCall::GetOrderBrackets {
            order_id: order_id.to_string(),
        })
        .await?;
        self.order(order_id).await?;

        let brackets = self.brackets.read().await;
        Ok(self
            .bracket_order
            .read()
            .await
            .iter()
            .filter_map(|id| brackets.get(id))
            .filter(|s| s.order_id == order_id)
            .map(|s| ProviderBracket {
                upload_url: None,
                ..s.bracket.clone()
            })
            .collect())
    }

    async fn upload_blob(
        &self,
        upload_url: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), ProviderError> {
        self.enter(ProviderCall::UploadBlob {
            url: upload_url.to_string(),
            size: bytes.len(),
            content_type: content_type.to_string(),
        })
        .await?;

        let mut brackets = self.brackets.write().await;
        let state = brackets
            .values_mut()
            .find(|s| s.bracket.upload_url.as_deref() == Some(upload_url))
            .ok_or_else(|| ProviderError::Api {
                status: 403,
                body: "unknown upload URL".to_string(),
            })?;
        state.bracket.is_uploaded = true;
        Ok(())
    }

    async fn process_order(
        &self,
        order_id: &str,
        request: &ProcessRequest,
    ) -> Result<ProviderOrder, ProviderError> {
        self.enter(ProviderCall::ProcessOrder {
            order_id: order_id.to_string(),
            request: request.clone(),
        })
        .await?;

        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| ProviderError::NotFound(format!("order {}", order_id)))?;
        order.is_processing = true;
        order.status = Some("processing".to_string());
        order.total_images = Some(request.images.len() as i64);
        order.updated_at = Some(chrono::Utc::now());
        Ok(order.clone())
    }

    async fn get_image(&self, image_id: &str) -> Result<ProviderImage, ProviderError> {
        self.enter(ProviderCall::GetImage {
            image_id: image_id.to_string(),
        })
        .await?;
        self.find_image(image_id).await
    }

    async fn download_enhanced(
        &self,
        image_id: &str,
        options: &DownloadOptions,
    ) -> Result<Vec<u8>, ProviderError> {
        self.enter(ProviderCall::DownloadEnhanced {
            image_id: image_id.to_string(),
            options: options.clone(),
        })
        .await?;
        self.find_image(image_id).await?;
        Ok(Self::enhanced_bytes(image_id, options))
    }

    async fn download_original(
        &self,
        image_id: &str,
        options: &DownloadOptions,
    ) -> Result<Vec<u8>, ProviderError> {
        self.enter(ProviderCall::DownloadOriginal {
            image_id: image_id.to_string(),
            options: options.clone(),
        })
        .await?;
        self.find_image(image_id).await?;
        Ok(format!("original:{}", image_id).into_bytes())
    }
}
