//! Provider callback endpoint.
//!
//! The provider posts `image_processed` events here while an order runs.
//! The handler acknowledges immediately; completion, failure and progress
//! work continues in a background task owned by the orchestrator.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use bracketeer_core::orchestrator::{WebhookAck, WebhookPayload};
use bracketeer_core::AuthError;

use super::error::ApiError;
use crate::metrics::AUTH_FAILURES_TOTAL;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl From<WebhookAck> for WebhookResponse {
    fn from(ack: WebhookAck) -> Self {
        let status = match ack {
            WebhookAck::Accepted => "accepted",
            WebhookAck::Updated => "updated",
            WebhookAck::Ignored => "ignored",
        };
        Self {
            status,
            message: None,
        }
    }
}

/// `POST /webhooks/enhancer`
///
/// An empty body is a liveness probe from the provider's registration flow
/// and is answered without a token. Anything else must carry the shared
/// bearer token.
pub async fn enhancer_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        debug!("Webhook liveness probe");
        return Ok(Json(WebhookResponse {
            status: "ok",
            message: Some("webhook endpoint is active"),
        }));
    }

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if let Err(e) = state.webhook_verifier().verify(authorization) {
        let reason = match e {
            AuthError::NotAuthenticated => "webhook_missing_token",
            _ => "webhook_invalid_token",
        };
        AUTH_FAILURES_TOTAL.with_label_values(&[reason]).inc();
        warn!(reason, "Rejected webhook call");
        return Err(ApiError::from(e));
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("invalid webhook payload: {}", e)))?;

    let dispatch = state.orchestrator().handle_webhook(payload)?;
    // The task runs to completion on its own; the provider only needs the ack.
    drop(dispatch.task);

    Ok(Json(WebhookResponse::from(dispatch.ack)))
}
