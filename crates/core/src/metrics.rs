//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - External services (enhancement provider, object store, broadcast)
//! - Orchestrator (uploads, webhooks, stored artifacts, status transitions)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// External Service Metrics
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "bracketeer_external_service_duration_seconds",
            "Duration of external service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["service", "operation"],
    )
    .unwrap()
});

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bracketeer_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// Retry attempts after a failed first try, by operation.
pub static RETRY_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bracketeer_retry_attempts_total", "Total retried calls"),
        &["operation"],
    )
    .unwrap()
});

/// Broadcast publishes by event and outcome.
pub static BROADCAST_PUBLISHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bracketeer_broadcast_publishes_total",
            "Broadcast events published",
        ),
        &["event", "status"], // status: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Orchestrator Metrics
// =============================================================================

/// Uploaded files by outcome.
pub static UPLOAD_FILES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bracketeer_upload_files_total", "Files handled by uploads"),
        &["outcome"], // "stored", "create_bracket", "upload", "verify"
    )
    .unwrap()
});

/// Webhook events received by kind.
pub static WEBHOOK_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bracketeer_webhook_events_total", "Provider webhook events"),
        &["event"],
    )
    .unwrap()
});

/// Artifacts handled by the completion and download paths.
pub static ARTIFACTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bracketeer_artifacts_total", "Enhanced artifacts handled"),
        &["source", "outcome"], // source: "webhook", "on_demand"
    )
    .unwrap()
});

/// Order status transitions.
pub static ORDER_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bracketeer_order_transitions_total",
            "Order status transitions",
        ),
        &["to_status"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Record the outcome and latency of one external call.
pub fn observe_external(service: &str, operation: &str, success: bool, elapsed_secs: f64) {
    let status = if success { "success" } else { "error" };
    EXTERNAL_SERVICE_REQUESTS
        .with_label_values(&[service, operation, status])
        .inc();
    EXTERNAL_SERVICE_DURATION
        .with_label_values(&[service, operation])
        .observe(elapsed_secs);
}

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
        Box::new(RETRY_ATTEMPTS.clone()),
        Box::new(BROADCAST_PUBLISHES.clone()),
        Box::new(UPLOAD_FILES.clone()),
        Box::new(WEBHOOK_EVENTS.clone()),
        Box::new(ARTIFACTS.clone()),
        Box::new(ORDER_TRANSITIONS.clone()),
    ]
}
