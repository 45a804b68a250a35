use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::middleware::{auth_middleware, metrics_middleware};
use super::{handlers, orders, webhooks};
use crate::state::AppState;

/// Upper bound for one multipart upload of bracketed exposures.
const UPLOAD_BODY_LIMIT: usize = 32 * 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Routes acting on behalf of an authenticated user
    let user_routes = Router::new()
        .route("/config", get(handlers::get_config))
        // Orders
        .route("/orders", post(orders::create_order))
        .route("/orders", get(orders::list_orders))
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}", delete(orders::delete_order))
        .route("/orders/{id}/status", get(orders::order_status))
        .route("/orders/{id}/verify", get(orders::verify_order))
        .route(
            "/orders/{id}/upload",
            post(orders::upload).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/orders/{id}/process", post(orders::process))
        .route("/orders/{id}/files", get(orders::list_files))
        // Brackets
        .route("/orders/{id}/brackets", get(orders::list_brackets))
        .route(
            "/orders/{id}/brackets/{bracket_id}",
            delete(orders::delete_bracket),
        )
        // Enhanced images
        .route("/orders/{id}/images", get(orders::list_images))
        .route(
            "/orders/{id}/images/{image_id}/download",
            post(orders::download_image),
        )
        .route("/orders/{id}/images/{image_id}", delete(orders::delete_image))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // Health, scraping and provider callbacks carry their own (or no) auth
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/webhooks/enhancer", post(webhooks::enhancer_webhook));

    let api_routes = user_routes.merge(public_routes).with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
