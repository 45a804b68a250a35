//! Order API handlers.

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, PathRejection},
        Multipart, Path, Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use bracketeer_core::orchestrator::{
    CreateOrderRequest, DownloadOutcome, DownloadRequest, ImageListing, OrderStatusView,
    ProcessOptions, ProcessSummary, UploadFile, UploadOutcome, VerifyReport,
};
use bracketeer_core::order::{Bracket, ListPage, Order, StoredFile};

use super::error::ApiError;
use super::middleware::AuthUser;
use crate::state::AppState;

/// Multipart field carrying the comma-separated upload groups.
const GROUPS_FIELD: &str = "groups";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing orders
#[derive(Debug, Deserialize)]
pub struct ListOrdersParams {
    /// Maximum number of orders to return (default 100, max 1000)
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListOrdersResponse {
    pub orders: Vec<Order>,
    pub count: usize,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub order_id: Uuid,
    pub files: Vec<StoredFile>,
}

#[derive(Debug, Serialize)]
pub struct BracketsResponse {
    pub order_id: Uuid,
    pub brackets: Vec<Bracket>,
}

#[derive(Debug, Serialize)]
pub struct DeleteOrderResponse {
    pub order_id: Uuid,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteBracketResponse {
    pub deleted: bool,
    pub bracket: Bracket,
}

#[derive(Debug, Serialize)]
pub struct DeleteImageResponse {
    pub image_id: String,
    pub deleted_files: usize,
}

/// Optional JSON body: a missing body (no JSON content type) means defaults.
fn body_or_default<T: Default>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(rejection.into()),
    }
}

fn order_path(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::bad_request("order id must be a UUID"))
}

fn child_path(path: Result<Path<(Uuid, String)>, PathRejection>) -> Result<(Uuid, String), ApiError> {
    path.map(|Path(ids)| ids)
        .map_err(|_| ApiError::bad_request("order id must be a UUID"))
}

// ============================================================================
// Handlers
// ============================================================================

/// Create an order on the provider and mirror it locally
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let request = body_or_default(body)?;
    let order = state
        .orchestrator()
        .create_order(user_id, request.name, request.metadata)
        .await?;
    Ok(Json(order))
}

/// List the caller's orders, newest first
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<ListOrdersResponse>, ApiError> {
    let page = ListPage::new(params.limit, params.offset);
    let orders = state.orchestrator().list_orders(user_id, page).await?;
    Ok(Json(ListOrdersResponse {
        count: orders.len(),
        orders,
        limit: page.limit,
        offset: page.offset,
    }))
}

pub async fn get_order(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Order>, ApiError> {
    let order_id = order_path(path)?;
    Ok(Json(state.orchestrator().get_order(user_id, order_id).await?))
}

/// Force a reconciliation against the provider
pub async fn verify_order(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<VerifyReport>, ApiError> {
    let order_id = order_path(path)?;
    Ok(Json(state.orchestrator().verify_order(user_id, order_id).await?))
}

pub async fn delete_order(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<DeleteOrderResponse>, ApiError> {
    let order_id = order_path(path)?;
    state.orchestrator().delete_order(user_id, order_id).await?;
    Ok(Json(DeleteOrderResponse {
        order_id,
        deleted: true,
    }))
}

pub async fn order_status(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<OrderStatusView>, ApiError> {
    let order_id = order_path(path)?;
    Ok(Json(state.orchestrator().order_status(user_id, order_id)?))
}

/// Multipart upload of bracketed exposures.
///
/// Every part with a filename is a file. An optional `groups` text part
/// assigns each file (in order) to an upload group.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadOutcome>, ApiError> {
    let order_id = order_path(path)?;
    let mut multipart = multipart.map_err(|e| {
        ApiError::bad_request(format!("expected multipart body: {}", e.body_text()))
    })?;

    let mut files = Vec::new();
    let mut groups: Option<String> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(GROUPS_FIELD) {
            groups = Some(field.text().await?);
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        if filename.is_empty() {
            continue;
        }
        let bytes = field.bytes().await?;
        files.push(UploadFile {
            filename,
            bytes: bytes.to_vec(),
        });
    }

    info!(order_id = %order_id, files = files.len(), "Upload received");

    let outcome = state
        .orchestrator()
        .upload_files(user_id, order_id, files, groups.as_deref())
        .await?;
    Ok(Json(outcome))
}

/// Dispatch processing with optional overrides
pub async fn process(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ProcessOptions>, JsonRejection>,
) -> Result<Json<ProcessSummary>, ApiError> {
    let order_id = order_path(path)?;
    let options = body_or_default(body)?;
    let summary = state
        .orchestrator()
        .process_order(user_id, order_id, options)
        .await?;
    Ok(Json(summary))
}

pub async fn list_files(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<FilesResponse>, ApiError> {
    let order_id = order_path(path)?;
    let files = state.orchestrator().get_files(user_id, order_id)?;
    Ok(Json(FilesResponse { order_id, files }))
}

pub async fn list_brackets(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<BracketsResponse>, ApiError> {
    let order_id = order_path(path)?;
    let brackets = state.orchestrator().get_brackets(user_id, order_id)?;
    Ok(Json(BracketsResponse { order_id, brackets }))
}

pub async fn delete_bracket(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<(Uuid, String)>, PathRejection>,
) -> Result<Json<DeleteBracketResponse>, ApiError> {
    let (order_id, bracket_id) = child_path(path)?;
    let bracket = state
        .orchestrator()
        .delete_bracket(user_id, order_id, &bracket_id)?;
    Ok(Json(DeleteBracketResponse {
        deleted: true,
        bracket,
    }))
}

pub async fn list_images(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ImageListing>, ApiError> {
    let order_id = order_path(path)?;
    Ok(Json(state.orchestrator().list_images(user_id, order_id).await?))
}

/// Download one enhanced image at a chosen quality into storage
pub async fn download_image(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<(Uuid, String)>, PathRejection>,
    body: Result<Json<DownloadRequest>, JsonRejection>,
) -> Result<Json<DownloadOutcome>, ApiError> {
    let (order_id, image_id) = child_path(path)?;
    let request = body_or_default(body)?;
    let outcome = state
        .orchestrator()
        .download_image(user_id, order_id, &image_id, request)
        .await?;
    Ok(Json(outcome))
}

pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    path: Result<Path<(Uuid, String)>, PathRejection>,
) -> Result<Json<DeleteImageResponse>, ApiError> {
    let (order_id, image_id) = child_path(path)?;
    let deleted_files = state
        .orchestrator()
        .delete_image(user_id, order_id, &image_id)
        .await?;
    Ok(Json(DeleteImageResponse {
        image_id,
        deleted_files,
    }))
}
