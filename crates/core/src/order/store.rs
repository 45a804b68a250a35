//! Order store trait and errors.

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::types::{
    Bracket, ListPage, NewBracket, NewStoredFile, Order, OrderStatus, ProviderSnapshot,
    StoredFile,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },
}

/// Trait for order storage backends.
///
/// Reads that a user can reach are scoped by `user_id`. Lookups return
/// `Ok(None)` for rows that are missing or owned by someone else.
pub trait OrderStore: Send + Sync {
    /// Insert an order under the provider-assigned id.
    fn create_order(&self, id: Uuid, user_id: Uuid, metadata: Value) -> Result<Order, StoreError>;

    fn get_order(&self, id: Uuid, user_id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Unscoped lookup for callers without an identity (webhooks).
    fn get_order_by_id_no_user(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Newest first.
    fn list_orders(&self, user_id: Uuid, page: ListPage) -> Result<Vec<Order>, StoreError>;

    /// Move an order to `status`. Progress is normalised for the status.
    /// Fails with `InvalidTransition` when the state machine forbids it.
    fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        progress: u8,
    ) -> Result<Order, StoreError>;

    /// Record an error and mark the order failed.
    fn update_order_error(&self, id: Uuid, message: &str) -> Result<Order, StoreError>;

    /// Overwrite cached provider-side fields.
    fn sync_provider_fields(
        &self,
        id: Uuid,
        snapshot: &ProviderSnapshot,
    ) -> Result<Order, StoreError>;

    /// Delete an order and everything under it. Returns false if absent.
    fn delete_order(&self, id: Uuid, user_id: Uuid) -> Result<bool, StoreError>;

    fn create_bracket(&self, bracket: NewBracket) -> Result<Bracket, StoreError>;

    /// Brackets in insertion order.
    fn get_brackets_by_order(&self, order_id: Uuid) -> Result<Vec<Bracket>, StoreError>;

    fn update_bracket_image_id(&self, id: Uuid, image_id: &str) -> Result<(), StoreError>;

    fn delete_bracket(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Insert or refresh the row for `(user_id, order_id, storage_path)`.
    fn create_stored_file(&self, file: NewStoredFile) -> Result<StoredFile, StoreError>;

    /// Files in insertion order.
    fn get_stored_files(&self, order_id: Uuid, user_id: Uuid)
        -> Result<Vec<StoredFile>, StoreError>;

    fn delete_stored_file(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Order counts per status across all users.
    fn count_orders_by_status(&self) -> Result<Vec<(OrderStatus, i64)>, StoreError>;
}
