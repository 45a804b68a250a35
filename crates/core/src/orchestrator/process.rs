//! Process dispatch: group brackets and hand them to the provider.

use tracing::{error, info, warn};
use uuid::Uuid;

use super::grouping::group_brackets;
use super::service::Orchestrator;
use super::types::{OrchestratorError, ProcessOptions, ProcessSummary};
use crate::broadcast::OrderEvent;
use crate::order::{OrderStatus, ProviderSnapshot, StoreError};
use crate::provider::{retry, ImageGroup, ProcessRequest};

const DEFAULT_ENHANCE_TYPE: &str = "property";
const DEFAULT_WINDOW_PULL: &str = "WINDOWS_WITH_SKIES";

/// Real-estate defaults with caller overrides applied.
pub fn build_process_request(options: &ProcessOptions, images: Vec<Vec<String>>) -> ProcessRequest {
    ProcessRequest {
        enhance_type: options
            .enhance_type
            .clone()
            .unwrap_or_else(|| DEFAULT_ENHANCE_TYPE.to_string()),
        sky_replacement: options.sky_replacement.unwrap_or(true),
        window_pull_type: options
            .window_pull_type
            .clone()
            .unwrap_or_else(|| DEFAULT_WINDOW_PULL.to_string()),
        vertical_correction: options.vertical_correction.unwrap_or(true),
        lens_correction: options.lens_correction.unwrap_or(true),
        upscale: options.upscale,
        privacy: options.privacy,
        cloud_type: options.cloud_type.clone(),
        ai_version: options.ai_version.clone(),
        images: images
            .into_iter()
            .map(|bracket_ids| ImageGroup { bracket_ids })
            .collect(),
    }
}

impl Orchestrator {
    /// Group the order's brackets into images and dispatch processing.
    pub async fn process_order(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        options: ProcessOptions,
    ) -> Result<ProcessSummary, OrchestratorError> {
        let order = self.owned_order(user_id, order_id)?;

        let brackets: Vec<_> = self
            .store
            .get_brackets_by_order(order_id)?
            .into_iter()
            .filter(|b| b.is_uploaded)
            .collect();
        if brackets.is_empty() {
            return Err(OrchestratorError::Validation(
                "order has no uploaded brackets".to_string(),
            ));
        }

        if order.status == OrderStatus::Processing
            || !order.status.can_transition_to(OrderStatus::Processing)
        {
            return Err(OrchestratorError::InvalidState(format!(
                "cannot process an order in status {}",
                order.status
            )));
        }

        let per_image = match options.brackets_per_image {
            Some(0) => {
                return Err(OrchestratorError::Validation(
                    "brackets_per_image must be positive".to_string(),
                ))
            }
            Some(n) => n,
            None => self.config.brackets_per_image,
        };

        let grouping = options.bracket_grouping.clone().unwrap_or_default();
        let groups = group_brackets(&brackets, &grouping, per_image);
        let request = build_process_request(&options, groups);

        info!(
            order_id = %order_id,
            grouping = grouping.label(),
            images = request.images.len(),
            brackets = brackets.len(),
            "Dispatching order for processing"
        );

        // Marked before dispatch so a completion webhook that beats the
        // provider's response finds the order in `processing`.
        self.store
            .update_order_status(order_id, OrderStatus::Processing, 0)?;

        let provider_id = order_id.to_string();
        let echoed = match retry(&self.policy(), "process_order", || {
            self.provider.process_order(&provider_id, &request)
        })
        .await
        {
            Ok(echoed) => echoed,
            Err(e) => {
                error!(order_id = %order_id, error = %e, "Process dispatch failed");
                let message = format!("process dispatch failed: {}", e);
                match self.store.update_order_error(order_id, &message) {
                    Ok(_) => {
                        self.publish(
                            OrderEvent::ProcessingFailed {
                                order_id,
                                error: message,
                            },
                            Some(user_id),
                        )
                        .await;
                    }
                    Err(StoreError::InvalidTransition { from, .. }) => {
                        warn!(order_id = %order_id, status = %from, "Order settled before dispatch failed");
                    }
                    Err(store_err) => return Err(store_err.into()),
                }
                return Err(e.into());
            }
        };

        // A completion that landed during dispatch is newer than the echo.
        let mut order = self.owned_order(user_id, order_id)?;
        if order.status == OrderStatus::Processing {
            match self
                .store
                .sync_provider_fields(order_id, &ProviderSnapshot::from(&echoed))
            {
                Ok(synced) => order = synced,
                Err(e) => warn!(order_id = %order_id, error = %e, "Failed to cache provider fields"),
            }
        }

        self.publish(OrderEvent::ProcessingStarted { order_id }, Some(user_id))
            .await;

        Ok(ProcessSummary {
            order_id,
            status: order.status,
            grouping: grouping.label().to_string(),
            image_count: request.images.len(),
            bracket_count: brackets.len(),
            parameters: request,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let request = build_process_request(
            &ProcessOptions::default(),
            vec![vec!["b1".to_string()]],
        );
        assert_eq!(request.enhance_type, "property");
        assert!(request.sky_replacement);
        assert!(request.vertical_correction);
        assert!(request.lens_correction);
        assert_eq!(request.window_pull_type, "WINDOWS_WITH_SKIES");
        assert!(request.cloud_type.is_none());
        assert_eq!(request.images.len(), 1);
    }

    #[test]
    fn test_overrides_win() {
        let options = ProcessOptions {
            enhance_type: Some("interior".to_string()),
            sky_replacement: Some(false),
            cloud_type: Some("CLEAR".to_string()),
            upscale: Some(true),
            ..Default::default()
        };
        let request = build_process_request(&options, vec![]);
        assert_eq!(request.enhance_type, "interior");
        assert!(!request.sky_replacement);
        assert_eq!(request.cloud_type.as_deref(), Some("CLEAR"));
        assert_eq!(request.upscale, Some(true));
        assert!(request.privacy.is_none());
    }
}
