//! Webhook-driven paths: completion, failure and progress.

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::service::Orchestrator;
use super::types::{
    CompletionReport, OrchestratorError, WebhookAck, WebhookDispatch, WebhookPayload,
};
use crate::broadcast::OrderEvent;
use crate::metrics::{ARTIFACTS, WEBHOOK_EVENTS};
use crate::order::{NewStoredFile, Order, OrderStatus, ProviderSnapshot, StoreError};
use crate::provider::{retry, DownloadOptions, ProviderImage};

/// Error message recorded when the provider reports a failed image.
pub const IMAGE_FAILED_MESSAGE: &str = "image processing failed";

/// `enhanced_<first 8 of image id>_<yyyymmdd_hhmmss>.jpg`
pub fn enhanced_filename(image_id: &str, at: chrono::DateTime<Utc>) -> String {
    let prefix: String = image_id.chars().take(8).collect();
    format!("enhanced_{}_{}.jpg", prefix, at.format("%Y%m%d_%H%M%S"))
}

impl Orchestrator {
    /// Acknowledge a provider callback and start its side effects.
    ///
    /// Only structural problems are errors. Everything else runs in a
    /// background task so the provider gets its 200 immediately.
    pub fn handle_webhook(&self, payload: WebhookPayload) -> Result<WebhookDispatch, OrchestratorError> {
        WEBHOOK_EVENTS.with_label_values(&[webhook_label(&payload.event)]).inc();

        match payload.event.as_str() {
            "webhook_updated" => {
                info!("Provider webhook registration updated");
                Ok(WebhookDispatch {
                    ack: WebhookAck::Updated,
                    task: None,
                })
            }
            "image_processed" => {
                let raw_id = payload.order_id.as_deref().ok_or_else(|| {
                    OrchestratorError::Validation("image_processed without order_id".to_string())
                })?;
                let order_id = Uuid::parse_str(raw_id).map_err(|_| {
                    OrchestratorError::Validation(format!("order_id {:?} is not a UUID", raw_id))
                })?;

                info!(
                    order_id = %order_id,
                    image_id = ?payload.image_id,
                    error = payload.error,
                    order_is_processing = payload.order_is_processing,
                    "Image processed webhook"
                );

                let this = self.clone();
                let task = tokio::spawn(async move {
                    this.run_image_processed(order_id, payload).await;
                });
                Ok(WebhookDispatch {
                    ack: WebhookAck::Accepted,
                    task: Some(task),
                })
            }
            other => {
                warn!(event = other, "Ignoring unknown webhook event");
                Ok(WebhookDispatch {
                    ack: WebhookAck::Ignored,
                    task: None,
                })
            }
        }
    }

    async fn run_image_processed(&self, order_id: Uuid, payload: WebhookPayload) {
        let owner = self
            .store
            .get_order_by_id_no_user(order_id)
            .ok()
            .flatten()
            .map(|o| o.user_id);

        self.publish(
            OrderEvent::WebhookImageProcessed {
                order_id,
                image_id: payload.image_id.clone(),
                error: payload.error,
                order_is_processing: payload.order_is_processing,
            },
            owner,
        )
        .await;

        if payload.error {
            if let Err(e) = self.fail_order(order_id, IMAGE_FAILED_MESSAGE).await {
                error!(order_id = %order_id, error = %e, "Failure path failed");
            }
        } else if !payload.order_is_processing {
            if let Err(e) = self.complete_order(order_id, payload.image_id.as_deref()).await {
                error!(order_id = %order_id, error = %e, "Completion path failed");
            }
        } else {
            self.report_progress(order_id).await;
        }
    }

    /// Mark an order failed and tell its subscribers.
    ///
    /// Unknown orders are dropped. A completed order is left alone.
    pub async fn fail_order(&self, order_id: Uuid, message: &str) -> Result<(), OrchestratorError> {
        let Some(order) = self.store.get_order_by_id_no_user(order_id)? else {
            warn!(order_id = %order_id, "Failure for unknown order dropped");
            return Ok(());
        };

        match self.store.update_order_error(order_id, message) {
            Ok(_) => {}
            Err(StoreError::InvalidTransition { from, .. }) => {
                warn!(order_id = %order_id, status = %from, "Not failing a finished order");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        self.publish(
            OrderEvent::ProcessingFailed {
                order_id,
                error: message.to_string(),
            },
            Some(order.user_id),
        )
        .await;
        Ok(())
    }

    /// Download every finished image, store it, record it and announce it.
    ///
    /// Safe to replay: a repeat run stores fresh timestamped files (a run
    /// within the same second rewrites the same rows) and announces again.
    /// One image failing does not stop the others.
    pub async fn complete_order(
        &self,
        order_id: Uuid,
        hint_image_id: Option<&str>,
    ) -> Result<CompletionReport, OrchestratorError> {
        let Some(order) = self.store.get_order_by_id_no_user(order_id)? else {
            warn!(order_id = %order_id, "Completion for unknown order dropped");
            return Ok(CompletionReport::default());
        };
        if order.status == OrderStatus::Failed {
            info!(order_id = %order_id, "Skipping completion for failed order");
            return Ok(CompletionReport::default());
        }

        let provider_id = order_id.to_string();
        let provider_order = retry(&self.policy(), "get_order", || {
            self.provider.get_order(&provider_id)
        })
        .await?;

        if let Err(e) = self
            .store
            .sync_provider_fields(order_id, &ProviderSnapshot::from(&provider_order))
        {
            warn!(order_id = %order_id, error = %e, "Failed to cache provider fields");
        }

        let mut images: Vec<ProviderImage> = provider_order
            .images
            .into_iter()
            .filter(ProviderImage::is_completed)
            .collect();

        if images.is_empty() {
            if let Some(hint) = hint_image_id {
                match self.provider.get_image(hint).await {
                    Ok(image) if image.is_completed() => images.push(image),
                    Ok(_) => debug!(image_id = hint, "Hinted image not completed"),
                    Err(e) => debug!(image_id = hint, error = %e, "Hinted image lookup failed"),
                }
            }
        }

        let mut report = CompletionReport::default();
        for image in &images {
            match self.store_enhanced(&order, &image.image_id).await {
                Ok(url) => {
                    ARTIFACTS.with_label_values(&["webhook", "stored"]).inc();
                    report.storage_urls.push(url);
                }
                Err(e) => {
                    ARTIFACTS.with_label_values(&["webhook", "failed"]).inc();
                    warn!(
                        order_id = %order_id,
                        image_id = %image.image_id,
                        error = %e,
                        "Failed to store enhanced image"
                    );
                    report.failed_images.push(image.image_id.clone());
                }
            }
        }

        if report.storage_urls.is_empty() {
            info!(order_id = %order_id, "No enhanced images to announce");
            return Ok(report);
        }

        match self
            .store
            .update_order_status(order_id, OrderStatus::Completed, 100)
        {
            Ok(_) => {}
            Err(StoreError::InvalidTransition { from, .. }) => {
                warn!(order_id = %order_id, status = %from, "Completed images for order not in processing");
            }
            Err(e) => return Err(e.into()),
        }

        self.publish(
            OrderEvent::DownloadReady {
                order_id,
                storage_urls: report.storage_urls.clone(),
            },
            Some(order.user_id),
        )
        .await;

        if report.failed_images.is_empty() {
            self.publish(
                OrderEvent::ProcessingCompleted {
                    order_id,
                    file_count: report.storage_urls.len(),
                },
                Some(order.user_id),
            )
            .await;
        }

        info!(
            order_id = %order_id,
            stored = report.storage_urls.len(),
            failed = report.failed_images.len(),
            "Completion finished"
        );
        Ok(report)
    }

    async fn store_enhanced(&self, order: &Order, image_id: &str) -> Result<String, OrchestratorError> {
        let options = DownloadOptions::default();
        let bytes = retry(&self.policy(), "download_enhanced", || {
            self.provider.download_enhanced(image_id, &options)
        })
        .await?;

        let filename = enhanced_filename(image_id, Utc::now());
        let size = bytes.len() as i64;
        let object = self
            .objects
            .upload(order.user_id, order.id, &filename, bytes, "image/jpeg")
            .await?;

        if let Err(e) = self.store.create_stored_file(NewStoredFile {
            order_id: order.id,
            user_id: order.user_id,
            filename,
            provider_image_id: Some(image_id.to_string()),
            storage_path: object.storage_path.clone(),
            storage_url: object.public_url.clone(),
            file_size: size,
            mime_type: "image/jpeg".to_string(),
            is_final: true,
        }) {
            // The blob stays reachable through its URL.
            warn!(order_id = %order.id, path = %object.storage_path, error = %e, "Failed to record stored file");
        }

        Ok(object.public_url)
    }

    /// Best-effort progress event from the provider's image counts.
    async fn report_progress(&self, order_id: Uuid) {
        let provider_order = match self.provider.get_order(&order_id.to_string()).await {
            Ok(o) => o,
            Err(e) => {
                debug!(order_id = %order_id, error = %e, "Progress lookup failed");
                return;
            }
        };

        let total = provider_order
            .total_images
            .filter(|t| *t > 0)
            .unwrap_or(provider_order.images.len() as i64);
        if total <= 0 {
            return;
        }
        let done = provider_order
            .images
            .iter()
            .filter(|i| i.is_completed())
            .count() as i64;
        let progress = (done * 100 / total).clamp(0, 99) as u8;

        let owner = self
            .store
            .get_order_by_id_no_user(order_id)
            .ok()
            .flatten()
            .map(|o| o.user_id);
        self.publish(OrderEvent::ProcessingProgress { order_id, progress }, owner)
            .await;
    }
}

fn webhook_label(event: &str) -> &'static str {
    match event {
        "image_processed" => "image_processed",
        "webhook_updated" => "webhook_updated",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_enhanced_filename() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 13, 4, 9).unwrap();
        assert_eq!(
            enhanced_filename("abcdef123456", at),
            "enhanced_abcdef12_20240501_130409.jpg"
        );
        assert_eq!(enhanced_filename("img1", at), "enhanced_img1_20240501_130409.jpg");
    }
}
