//! Provider-facing types and the `EnhancementProvider` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::retry::Transient;
use super::timestamps;

/// Errors from the enhancement provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Non-2xx response other than 404. Carries the response body verbatim.
    #[error("provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("provider resource not found: {0}")]
    NotFound(String),

    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider request timed out")]
    Timeout,

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::InvalidResponse(e.to_string())
        } else {
            ProviderError::Transport(e.to_string())
        }
    }
}

impl Transient for ProviderError {
    fn is_transient(&self) -> bool {
        match self {
            ProviderError::Api { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            ProviderError::Transport(_) | ProviderError::Timeout => true,
            ProviderError::NotFound(_) | ProviderError::InvalidResponse(_) => false,
        }
    }
}

/// An order as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderOrder {
    #[serde(alias = "id")]
    pub order_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_processing: bool,
    #[serde(default)]
    pub is_merging: bool,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub total_images: Option<i64>,
    #[serde(default, deserialize_with = "timestamps::deserialize_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamps::deserialize_option")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub images: Vec<ProviderImage>,
}

/// A single uploaded exposure slot on the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderBracket {
    #[serde(alias = "id")]
    pub bracket_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Pre-signed PUT URL. Only present right after creation.
    #[serde(default)]
    pub upload_url: Option<String>,
    #[serde(default)]
    pub is_uploaded: bool,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A merged output image on the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderImage {
    #[serde(alias = "id")]
    pub image_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub status_reason: Option<String>,
    #[serde(default)]
    pub bracket_ids: Vec<String>,
}

impl ProviderImage {
    /// True when the image finished without a failure reason.
    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some("completed")
            && self.status_reason.as_deref().is_none_or(str::is_empty)
    }
}

/// One group of provider bracket ids merged into one image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageGroup {
    pub bracket_ids: Vec<String>,
}

/// Body of `POST /orders/{id}/process`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessRequest {
    pub enhance_type: String,
    pub sky_replacement: bool,
    pub window_pull_type: String,
    pub vertical_correction: bool,
    pub lens_correction: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upscale: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_version: Option<String>,
    pub images: Vec<ImageGroup>,
}

/// Query options for enhanced and original downloads.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadOptions {
    pub format: String,
    pub preview: Option<bool>,
    pub watermark: Option<bool>,
    pub finetune: Option<bool>,
    pub max_width: Option<u32>,
    pub scale: Option<f32>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            format: "jpeg".to_string(),
            preview: None,
            watermark: None,
            finetune: None,
            max_width: None,
            scale: None,
        }
    }
}

impl DownloadOptions {
    /// Query pairs for the download endpoint. Unset options are omitted.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("format", self.format.clone())];
        if let Some(v) = self.preview {
            pairs.push(("preview", v.to_string()));
        }
        if let Some(v) = self.watermark {
            pairs.push(("watermark", v.to_string()));
        }
        if let Some(v) = self.finetune {
            pairs.push(("finetune", v.to_string()));
        }
        if let Some(v) = self.max_width {
            pairs.push(("max_width", v.to_string()));
        }
        if let Some(v) = self.scale {
            pairs.push(("scale", v.to_string()));
        }
        pairs
    }
}

/// The external AI service that merges bracketed exposures.
///
/// All identifiers are the provider's own. Implementations must be safe to
/// share across request handlers and background tasks.
#[async_trait]
pub trait EnhancementProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    async fn create_order(&self, name: Option<&str>) -> Result<ProviderOrder, ProviderError>;

    async fn get_order(&self, order_id: &str) -> Result<ProviderOrder, ProviderError>;

    async fn delete_order(&self, order_id: &str) -> Result<(), ProviderError>;

    /// Create a bracket slot. The returned bracket carries a pre-signed
    /// upload URL.
    async fn create_bracket(
        &self,
        order_id: &str,
        name: &str,
    ) -> Result<ProviderBracket, ProviderError>;

    async fn get_bracket(&self, bracket_id: &str) -> Result<ProviderBracket, ProviderError>;

    async fn get_order_brackets(
        &self,
        order_id: &str,
    ) -> Result<Vec<ProviderBracket>, ProviderError>;

    /// PUT raw bytes to a pre-signed URL.
    async fn upload_blob(
        &self,
        upload_url: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), ProviderError>;

    async fn process_order(
        &self,
        order_id: &str,
        request: &ProcessRequest,
    ) -> Result<ProviderOrder, ProviderError>;

    async fn get_image(&self, image_id: &str) -> Result<ProviderImage, ProviderError>;

    async fn download_enhanced(
        &self,
        image_id: &str,
        options: &DownloadOptions,
    ) -> Result<Vec<u8>, ProviderError>;

    async fn download_original(
        &self,
        image_id: &str,
        options: &DownloadOptions,
    ) -> Result<Vec<u8>, ProviderError>;
}
