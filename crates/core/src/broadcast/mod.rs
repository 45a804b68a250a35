//! Real-time broadcast of per-order events.
//!
//! Events go to `order:<uuid>` and, for the ones a user dashboard cares
//! about, to `user:<uuid>` as well. Publication is best-effort: callers go
//! through [`announce`], which logs and counts failures but never returns
//! them.

mod events;
mod http;

pub use events::{order_topic, user_topic, OrderEvent};
pub use http::HttpBroadcaster;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::metrics::BROADCAST_PUBLISHES;

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("broadcast request failed: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for BroadcastError {
    fn from(e: reqwest::Error) -> Self {
        BroadcastError::Transport(e.to_string())
    }
}

/// Fan-out channel for typed order events.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Publish one event on one topic.
    async fn publish(&self, topic: &str, event: &OrderEvent) -> Result<(), BroadcastError>;
}

/// Publish an event on its order topic (and the user topic when relevant),
/// swallowing failures.
pub async fn announce(broadcaster: &dyn Broadcaster, event: &OrderEvent, user_id: Option<Uuid>) {
    let mut topics = vec![order_topic(event.order_id())];
    if let Some(user_id) = user_id.filter(|_| event.is_user_scoped()) {
        topics.push(user_topic(user_id));
    }

    for topic in topics {
        match broadcaster.publish(&topic, event).await {
            Ok(()) => {
                debug!(topic = %topic, event = event.name(), "Broadcast published");
                BROADCAST_PUBLISHES
                    .with_label_values(&[event.name(), "success"])
                    .inc();
            }
            Err(e) => {
                warn!(topic = %topic, event = event.name(), error = %e, "Broadcast failed");
                BROADCAST_PUBLISHES
                    .with_label_values(&[event.name(), "error"])
                    .inc();
            }
        }
    }
}
