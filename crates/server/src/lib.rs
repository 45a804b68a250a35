//! HTTP surface for bracketeer: order API, provider webhooks and metrics.

pub mod api;
pub mod metrics;
pub mod state;
