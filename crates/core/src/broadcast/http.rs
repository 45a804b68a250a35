use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{BroadcastError, Broadcaster, OrderEvent};
use crate::config::BroadcastConfig;
use crate::metrics::observe_external;

/// Publishes through the real-time service's HTTP broadcast endpoint.
pub struct HttpBroadcaster {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpBroadcaster {
    pub fn new(config: &BroadcastConfig) -> Result<Self, BroadcastError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/realtime/v1/api/broadcast",
                config.url.trim_end_matches('/')
            ),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl Broadcaster for HttpBroadcaster {
    async fn publish(&self, topic: &str, event: &OrderEvent) -> Result<(), BroadcastError> {
        let body = json!({
            "messages": [{
                "topic": topic,
                "event": event.name(),
                "payload": event.stamped_payload(),
            }]
        });

        let start = Instant::now();
        let result = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        let outcome = match result {
            Ok(response) if matches!(response.status().as_u16(), 200 | 201 | 202) => Ok(()),
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                Err(BroadcastError::Rejected { status, body })
            }
            Err(e) => Err(BroadcastError::from(e)),
        };

        observe_external(
            "broadcast",
            event.name(),
            outcome.is_ok(),
            start.elapsed().as_secs_f64(),
        );
        outcome
    }
}
