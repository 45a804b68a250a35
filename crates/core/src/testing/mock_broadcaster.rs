//! Mock broadcaster for testing.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::broadcast::{BroadcastError, Broadcaster, OrderEvent};

/// A message the mock accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub event: String,
    pub payload: Value,
}

/// Mock implementation of the Broadcaster trait that records messages.
#[derive(Debug)]
pub struct MockBroadcaster {
    published: Arc<RwLock<Vec<PublishedMessage>>>,
    fail: Arc<RwLock<bool>>,
}

impl Default for MockBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBroadcaster {
    pub fn new() -> Self {
        Self {
            published: Arc::new(RwLock::new(Vec::new())),
            fail: Arc::new(RwLock::new(false)),
        }
    }

    /// Reject every publish until reset.
    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.read().await.clone()
    }

    /// Event names published to one topic, in order.
    pub async fn events_on(&self, topic: &str) -> Vec<String> {
        self.published
            .read()
            .await
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.event.clone())
            .collect()
    }

    pub async fn clear(&self) {
        self.published.write().await.clear();
    }
}

#[async_trait]
impl Broadcaster for MockBroadcaster {
    async fn publish(&self, topic: &str, event: &OrderEvent) -> Result<(), BroadcastError> {
        if *self.fail.read().await {
            return Err(BroadcastError::Rejected {
                status: 503,
                body: "mock broadcast failure".to_string(),
            });
        }
        self.published.write().await.push(PublishedMessage {
            topic: topic.to_string(),
            event: event.name().to_string(),
            payload: event.stamped_payload(),
        });
        Ok(())
    }
}
