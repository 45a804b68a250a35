//! Types for the order orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::grouping::BracketGrouping;
use crate::order::{Bracket, Order, OrderStatus, StoreError, StoredFile};
use crate::provider::{ProcessRequest, ProviderError};
use crate::storage::StorageError;

/// Errors that can occur during orchestration.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Caller input is malformed.
    #[error("{0}")]
    Validation(String),

    /// Row missing or not owned by the caller.
    #[error("{0} not found")]
    NotFound(String),

    /// The order's status does not allow the operation.
    #[error("{0}")]
    InvalidState(String),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("object store error: {0}")]
    Storage(#[from] StorageError),

    #[error("store error: {0}")]
    Store(StoreError),

    /// Every file of an upload failed.
    #[error("all {} files failed to upload", .0.len())]
    UploadFailed(Vec<UploadError>),
}

impl From<StoreError> for OrchestratorError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => OrchestratorError::NotFound(what),
            StoreError::InvalidTransition { from, to, .. } => OrchestratorError::InvalidState(
                format!("order cannot move from {} to {}", from, to),
            ),
            other => OrchestratorError::Store(other),
        }
    }
}

/// Request to create an order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// One file of a multipart upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Where in the per-file pipeline an upload failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStage {
    CreateBracket,
    Upload,
    Verify,
    Persist,
}

impl UploadStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStage::CreateBracket => "create_bracket",
            UploadStage::Upload => "upload",
            UploadStage::Verify => "verify",
            UploadStage::Persist => "persist",
        }
    }
}

/// A per-file upload failure. `verify` failures are informational.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadError {
    pub filename: String,
    pub stage: UploadStage,
    pub message: String,
}

/// A file that made it to the provider and into the local store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub filename: String,
    pub id: Uuid,
    pub bracket_id: String,
    pub image_id: Option<String>,
    pub group_id: String,
    pub mime_type: String,
    pub size: usize,
    pub verified: bool,
}

/// Result of a (possibly partial) upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub files: Vec<UploadedFile>,
    pub errors: Vec<UploadError>,
}

/// Caller overrides for process dispatch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessOptions {
    #[serde(default)]
    pub enhance_type: Option<String>,
    #[serde(default)]
    pub sky_replacement: Option<bool>,
    #[serde(default)]
    pub window_pull_type: Option<String>,
    #[serde(default)]
    pub vertical_correction: Option<bool>,
    #[serde(default)]
    pub lens_correction: Option<bool>,
    #[serde(default)]
    pub upscale: Option<bool>,
    #[serde(default)]
    pub privacy: Option<bool>,
    #[serde(default)]
    pub cloud_type: Option<String>,
    #[serde(default)]
    pub ai_version: Option<String>,
    #[serde(default)]
    pub bracket_grouping: Option<BracketGrouping>,
    /// Overrides the configured chunk size for `auto` grouping.
    #[serde(default)]
    pub brackets_per_image: Option<usize>,
}

/// What was dispatched to the provider.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub grouping: String,
    pub image_count: usize,
    pub bracket_count: usize,
    pub parameters: ProcessRequest,
}

/// Inbound provider callback. Only `event` is mandatory.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct WebhookPayload {
    pub event: String,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_is_processing: bool,
}

/// How a webhook was acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAck {
    /// `image_processed` accepted; work continues in the background.
    Accepted,
    /// `webhook_updated` registration notice.
    Updated,
    /// Unknown event kind, acknowledged and dropped.
    Ignored,
}

/// Acknowledgement plus the background task, if one was started.
pub struct WebhookDispatch {
    pub ack: WebhookAck,
    pub task: Option<JoinHandle<()>>,
}

/// What the completion path produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionReport {
    pub storage_urls: Vec<String>,
    pub failed_images: Vec<String>,
}

/// Named output sizes for on-demand downloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Thumbnail,
    #[default]
    Preview,
    Medium,
    High,
    Custom,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Thumbnail => "thumbnail",
            Quality::Preview => "preview",
            Quality::Medium => "medium",
            Quality::High => "high",
            Quality::Custom => "custom",
        }
    }

    /// Fixed width for the named qualities. `high` is full size.
    pub fn max_width(&self) -> Option<u32> {
        match self {
            Quality::Thumbnail => Some(400),
            Quality::Preview => Some(800),
            Quality::Medium => Some(1920),
            Quality::High | Quality::Custom => None,
        }
    }
}

/// Body of an on-demand download.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadRequest {
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub max_width: Option<u32>,
    #[serde(default)]
    pub scale: Option<f32>,
    /// Defaults to true. A clean copy consumes provider credits.
    #[serde(default)]
    pub watermark: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutcome {
    pub image_id: String,
    pub quality: Quality,
    pub watermark: bool,
    pub consumes_credits: bool,
    pub file: StoredFile,
    pub message: String,
}

/// One provider image joined with what we stored for it.
#[derive(Debug, Clone, Serialize)]
pub struct ImageEntry {
    pub image_id: String,
    pub status: Option<String>,
    pub status_reason: Option<String>,
    pub downloaded: bool,
    pub files: Vec<StoredFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageListing {
    pub order_id: Uuid,
    pub provider_reachable: bool,
    pub images: Vec<ImageEntry>,
}

/// Cached status of an order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderStatusView {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub progress: u8,
    pub error_message: Option<String>,
    pub provider_status: Option<String>,
    pub is_processing: bool,
    pub is_merging: bool,
    pub is_deleted: bool,
    pub bracket_count: usize,
    pub file_count: usize,
    pub updated_at: DateTime<Utc>,
}

/// Result of a forced reconciliation.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub order: Order,
    pub local_brackets: usize,
    pub provider_brackets: usize,
    pub uploaded_on_provider: usize,
    /// Local bracket ids the provider no longer knows.
    pub missing_on_provider: Vec<String>,
    /// Provider bracket ids with no local row.
    pub unknown_locally: Vec<String>,
    pub image_ids_adopted: usize,
    pub brackets: Vec<Bracket>,
}
