//! The order lifecycle coordinator: order-level operations.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::OrchestratorConfig;
use super::types::{OrchestratorError, OrderStatusView, VerifyReport};
use crate::broadcast::{announce, Broadcaster, OrderEvent};
use crate::order::{Bracket, ListPage, Order, OrderStore, ProviderSnapshot, StoredFile};
use crate::provider::{retry, EnhancementProvider, ProviderError, RetryPolicy};
use crate::storage::ObjectStore;

/// Stateless coordinator over the provider, object store, order store and
/// broadcast channel. Cheap to clone; background tasks get their own copy.
#[derive(Clone)]
pub struct Orchestrator {
    pub(super) config: OrchestratorConfig,
    pub(super) provider: Arc<dyn EnhancementProvider>,
    pub(super) objects: Arc<dyn ObjectStore>,
    pub(super) store: Arc<dyn OrderStore>,
    pub(super) broadcaster: Arc<dyn Broadcaster>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        provider: Arc<dyn EnhancementProvider>,
        objects: Arc<dyn ObjectStore>,
        store: Arc<dyn OrderStore>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            config,
            provider,
            objects,
            store,
            broadcaster,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub(super) fn policy(&self) -> RetryPolicy {
        self.config.retry_policy()
    }

    pub(super) async fn publish(&self, event: OrderEvent, user_id: Option<Uuid>) {
        announce(self.broadcaster.as_ref(), &event, user_id).await;
    }

    /// Load an order owned by `user_id` or fail with `NotFound`.
    pub(super) fn owned_order(&self, user_id: Uuid, order_id: Uuid) -> Result<Order, OrchestratorError> {
        self.store
            .get_order(order_id, user_id)?
            .ok_or_else(|| OrchestratorError::NotFound(format!("order {}", order_id)))
    }

    /// Create an order on the provider, then mirror it locally under the
    /// provider's id.
    pub async fn create_order(
        &self,
        user_id: Uuid,
        name: Option<String>,
        metadata: Option<Value>,
    ) -> Result<Order, OrchestratorError> {
        let provider_order = retry(&self.policy(), "create_order", || {
            self.provider.create_order(name.as_deref())
        })
        .await?;

        let order_id = Uuid::parse_str(&provider_order.order_id).map_err(|_| {
            ProviderError::InvalidResponse(format!(
                "order id {:?} is not a UUID",
                provider_order.order_id
            ))
        })?;

        self.store
            .create_order(order_id, user_id, metadata.unwrap_or_else(|| json!({})))?;

        let mut snapshot = ProviderSnapshot::from(&provider_order);
        if snapshot.name.is_none() {
            snapshot.name = name;
        }
        let order = self.store.sync_provider_fields(order_id, &snapshot)?;

        info!(order_id = %order_id, user_id = %user_id, "Created order");
        Ok(order)
    }

    /// The caller's orders, newest first, with unnamed rows refreshed from
    /// the provider.
    pub async fn list_orders(
        &self,
        user_id: Uuid,
        page: ListPage,
    ) -> Result<Vec<Order>, OrchestratorError> {
        let orders = self.store.list_orders(user_id, page)?;

        // Unnamed rows refresh concurrently, each under its own deadline.
        let mut pending = Vec::with_capacity(orders.len());
        for order in orders {
            if order.name.is_some() {
                pending.push((order, None));
                continue;
            }
            let this = self.clone();
            let cached = order.clone();
            let task = tokio::spawn(async move { this.refresh_if_unnamed(order).await });
            pending.push((cached, Some(task)));
        }

        let mut refreshed = Vec::with_capacity(pending.len());
        for (cached, task) in pending {
            match task {
                Some(task) => refreshed.push(task.await.unwrap_or(cached)),
                None => refreshed.push(cached),
            }
        }
        Ok(refreshed)
    }

    pub async fn get_order(&self, user_id: Uuid, order_id: Uuid) -> Result<Order, OrchestratorError> {
        let order = self.owned_order(user_id, order_id)?;
        Ok(self.refresh_if_unnamed(order).await)
    }

    /// Pull provider fields for a row that has no name yet.
    ///
    /// The fresh values are returned right away and persisted in the
    /// background. Provider failures leave the cached row untouched.
    async fn refresh_if_unnamed(&self, mut order: Order) -> Order {
        if order.name.is_some() {
            return order;
        }

        let provider_id = order.id.to_string();
        let lookup = timeout(
            self.config.refresh_timeout(),
            self.provider.get_order(&provider_id),
        )
        .await;

        match lookup {
            Ok(Ok(provider_order)) => {
                let snapshot = ProviderSnapshot::from(&provider_order);
                order.apply_snapshot(&snapshot);

                let store = Arc::clone(&self.store);
                let order_id = order.id;
                tokio::spawn(async move {
                    if let Err(e) = store.sync_provider_fields(order_id, &snapshot) {
                        warn!(order_id = %order_id, error = %e, "Failed to persist provider snapshot");
                    }
                });
            }
            Ok(Err(e)) => {
                debug!(order_id = %order.id, error = %e, "Provider refresh skipped");
            }
            Err(_) => {
                debug!(order_id = %order.id, "Provider refresh timed out");
            }
        }
        order
    }

    pub fn order_status(&self, user_id: Uuid, order_id: Uuid) -> Result<OrderStatusView, OrchestratorError> {
        let order = self.owned_order(user_id, order_id)?;
        let bracket_count = self.store.get_brackets_by_order(order_id)?.len();
        let file_count = self.store.get_stored_files(order_id, user_id)?.len();

        Ok(OrderStatusView {
            order_id,
            status: order.status,
            progress: order.progress,
            error_message: order.error_message,
            provider_status: order.provider_status,
            is_processing: order.is_processing,
            is_merging: order.is_merging,
            is_deleted: order.is_deleted,
            bracket_count,
            file_count,
            updated_at: order.updated_at,
        })
    }

    pub fn get_brackets(&self, user_id: Uuid, order_id: Uuid) -> Result<Vec<Bracket>, OrchestratorError> {
        self.owned_order(user_id, order_id)?;
        Ok(self.store.get_brackets_by_order(order_id)?)
    }

    pub fn get_files(&self, user_id: Uuid, order_id: Uuid) -> Result<Vec<StoredFile>, OrchestratorError> {
        self.owned_order(user_id, order_id)?;
        Ok(self.store.get_stored_files(order_id, user_id)?)
    }

    /// Delete one local bracket, addressed by local id or provider bracket id.
    pub fn delete_bracket(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        bracket: &str,
    ) -> Result<Bracket, OrchestratorError> {
        self.owned_order(user_id, order_id)?;
        let target = self
            .store
            .get_brackets_by_order(order_id)?
            .into_iter()
            .find(|b| b.id.to_string() == bracket || b.bracket_id == bracket)
            .ok_or_else(|| OrchestratorError::NotFound(format!("bracket {}", bracket)))?;

        self.store.delete_bracket(target.id)?;
        info!(order_id = %order_id, bracket_id = %target.bracket_id, "Deleted bracket");
        Ok(target)
    }

    /// Delete an order everywhere: provider first, then blobs, then rows.
    ///
    /// A provider 404 counts as already deleted. Any other failure stops
    /// before local state is touched.
    pub async fn delete_order(&self, user_id: Uuid, order_id: Uuid) -> Result<(), OrchestratorError> {
        self.owned_order(user_id, order_id)?;

        let provider_id = order_id.to_string();
        match retry(&self.policy(), "delete_order", || {
            self.provider.delete_order(&provider_id)
        })
        .await
        {
            Ok(()) => {}
            Err(ProviderError::NotFound(_)) => {
                debug!(order_id = %order_id, "Provider order already gone");
            }
            Err(e) => return Err(e.into()),
        }

        let removed = self.objects.delete_order_prefix(user_id, order_id).await?;
        self.store.delete_order(order_id, user_id)?;

        info!(order_id = %order_id, objects = removed, "Deleted order");
        Ok(())
    }

    /// Force a reconciliation between local brackets and the provider.
    pub async fn verify_order(&self, user_id: Uuid, order_id: Uuid) -> Result<VerifyReport, OrchestratorError> {
        self.owned_order(user_id, order_id)?;
        let provider_id = order_id.to_string();

        let provider_order = retry(&self.policy(), "get_order", || {
            self.provider.get_order(&provider_id)
        })
        .await?;
        let provider_brackets = retry(&self.policy(), "get_order_brackets", || {
            self.provider.get_order_brackets(&provider_id)
        })
        .await?;

        let order = self
            .store
            .sync_provider_fields(order_id, &ProviderSnapshot::from(&provider_order))?;

        let local = self.store.get_brackets_by_order(order_id)?;
        let mut adopted = 0;
        let mut missing_on_provider = Vec::new();
        for bracket in &local {
            match provider_brackets
                .iter()
                .find(|p| p.bracket_id == bracket.bracket_id)
            {
                Some(remote) => {
                    if let Some(image_id) = &remote.image_id {
                        if bracket.image_id.as_ref() != Some(image_id) {
                            self.store.update_bracket_image_id(bracket.id, image_id)?;
                            adopted += 1;
                        }
                    }
                }
                None => missing_on_provider.push(bracket.bracket_id.clone()),
            }
        }

        let unknown_locally = provider_brackets
            .iter()
            .filter(|p| !local.iter().any(|b| b.bracket_id == p.bracket_id))
            .map(|p| p.bracket_id.clone())
            .collect();

        info!(
            order_id = %order_id,
            local = local.len(),
            remote = provider_brackets.len(),
            adopted,
            "Verified order against provider"
        );

        Ok(VerifyReport {
            order,
            local_brackets: local.len(),
            provider_brackets: provider_brackets.len(),
            uploaded_on_provider: provider_brackets.iter().filter(|p| p.is_uploaded).count(),
            missing_on_provider,
            unknown_locally,
            image_ids_adopted: adopted,
            brackets: self.store.get_brackets_by_order(order_id)?,
        })
    }
}
