use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::provider::ProviderOrder;

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Uploading,
    Uploaded,
    Processing,
    PreviewsReady,
    Completed,
    Failed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Created,
        OrderStatus::Uploading,
        OrderStatus::Uploaded,
        OrderStatus::Processing,
        OrderStatus::PreviewsReady,
        OrderStatus::Completed,
        OrderStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Uploading => "uploading",
            OrderStatus::Uploaded => "uploaded",
            OrderStatus::Processing => "processing",
            OrderStatus::PreviewsReady => "previews_ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
        }
    }

    /// Terminal statuses never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed)
    }

    /// Whether progress is pinned at 100.
    pub fn is_finished(&self) -> bool {
        matches!(self, OrderStatus::PreviewsReady | OrderStatus::Completed)
    }

    /// Whether an order in this status may move to `next`.
    ///
    /// Re-entering the current status is always allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        if *self == next {
            return true;
        }
        match (self, next) {
            (Created, Uploading) | (Uploaded, Uploading) => true,
            (Uploading, Uploaded) => true,
            (Uploaded, Processing) => true,
            (Processing, PreviewsReady) | (Processing, Completed) => true,
            (PreviewsReady, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Bring a requested progress value in line with the status.
    pub fn normalize_progress(&self, progress: i64) -> u8 {
        if self.is_finished() {
            100
        } else {
            progress.clamp(0, 99) as u8
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {}", s))
    }
}

/// An order as seen by its owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// Provider-assigned id, used verbatim as the local key.
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub progress: u8,
    pub metadata: Value,
    pub name: Option<String>,
    pub provider_status: Option<String>,
    pub is_processing: bool,
    pub is_merging: bool,
    pub is_deleted: bool,
    pub total_images: Option<i64>,
    pub provider_last_updated_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Overlay a provider snapshot in memory, mirroring what the store's
    /// `sync_provider_fields` writes.
    pub fn apply_snapshot(&mut self, snapshot: &ProviderSnapshot) {
        if snapshot.name.is_some() {
            self.name = snapshot.name.clone();
        }
        self.provider_status = snapshot.provider_status.clone();
        self.is_processing = snapshot.is_processing;
        self.is_merging = snapshot.is_merging;
        self.is_deleted = snapshot.is_deleted;
        self.total_images = snapshot.total_images;
        self.provider_last_updated_at = snapshot.updated_at;
    }
}

/// Provider-side fields cached on the order row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderSnapshot {
    pub name: Option<String>,
    pub provider_status: Option<String>,
    pub is_processing: bool,
    pub is_merging: bool,
    pub is_deleted: bool,
    pub total_images: Option<i64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&ProviderOrder> for ProviderSnapshot {
    fn from(order: &ProviderOrder) -> Self {
        Self {
            name: order.name.clone(),
            provider_status: order.status.clone(),
            is_processing: order.is_processing,
            is_merging: order.is_merging,
            is_deleted: order.is_deleted,
            total_images: order
                .total_images
                .or_else(|| (!order.images.is_empty()).then_some(order.images.len() as i64)),
            updated_at: order.updated_at.or(order.created_at),
        }
    }
}

/// Local shadow of one provider bracket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bracket {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Provider bracket id.
    pub bracket_id: String,
    pub image_id: Option<String>,
    pub filename: String,
    pub upload_url: Option<String>,
    pub is_uploaded: bool,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl Bracket {
    /// The upload group this bracket belongs to, if any.
    pub fn group_id(&self) -> Option<&str> {
        self.metadata
            .get("group_id")
            .and_then(Value::as_str)
            .filter(|g| !g.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct NewBracket {
    pub order_id: Uuid,
    pub bracket_id: String,
    pub image_id: Option<String>,
    pub filename: String,
    pub upload_url: Option<String>,
    pub is_uploaded: bool,
    pub metadata: Value,
}

/// A blob persisted in the object store for an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredFile {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub provider_image_id: Option<String>,
    pub storage_path: String,
    pub storage_url: String,
    pub file_size: i64,
    pub mime_type: String,
    /// True for provider-produced artifacts.
    pub is_final: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStoredFile {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub filename: String,
    pub provider_image_id: Option<String>,
    pub storage_path: String,
    pub storage_url: String,
    pub file_size: i64,
    pub mime_type: String,
    pub is_final: bool,
}

/// Pagination for order listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListPage {
    pub limit: i64,
    pub offset: i64,
}

impl ListPage {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 1000;

    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for ListPage {
    fn default() -> Self {
        Self::new(None, None)
    }
}
