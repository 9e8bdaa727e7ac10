//! Permanent stock decrement on payment confirmation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use cache::Cache;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use store::CatalogStore;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{InventoryError, Result};
use crate::keys;

/// Error returned by a notification sink.
#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// A stock-change event published so other active sessions viewing the
/// product know to re-poll.
#[derive(Debug, Clone)]
pub struct StockNotice {
    /// Event identifier.
    pub id: Uuid,
    /// Product whose stock changed.
    pub product_id: ProductId,
    /// Stock level after the change.
    pub new_stock: u32,
    /// Order that triggered the change.
    pub order_id: OrderId,
    /// When the change was committed.
    pub at: DateTime<Utc>,
}

/// Sink for stock-change notifications.
#[async_trait]
pub trait StockNotifier: Send + Sync {
    /// Publishes a stock change. Best-effort: failures are logged by the
    /// caller and never abort the sale.
    async fn stock_changed(&self, notice: StockNotice) -> std::result::Result<(), NotifyError>;

    /// Opens a live feed of stock changes, if the sink supports one.
    ///
    /// Server push is preferred over client polling; sinks that cannot fan
    /// out return None and clients fall back to the polling endpoints.
    fn subscribe(&self) -> Option<broadcast::Receiver<StockNotice>> {
        None
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    notices: Vec<StockNotice>,
    fail_on_notify: bool,
}

/// In-memory notification sink for testing and single-process deployments.
///
/// Records every notice and fans it out to live subscribers over a broadcast
/// channel.
#[derive(Debug, Clone)]
pub struct InMemoryStockNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
    sender: broadcast::Sender<StockNotice>,
}

impl Default for InMemoryStockNotifier {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            state: Arc::default(),
            sender,
        }
    }
}

impl InMemoryStockNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail on the next publish.
    pub fn set_fail_on_notify(&self, fail: bool) {
        self.state.write().unwrap().fail_on_notify = fail;
    }

    /// Returns the number of notices published.
    pub fn notice_count(&self) -> usize {
        self.state.read().unwrap().notices.len()
    }

    /// Returns the published notices for a product.
    pub fn notices_for(&self, product_id: &ProductId) -> Vec<StockNotice> {
        self.state
            .read()
            .unwrap()
            .notices
            .iter()
            .filter(|n| &n.product_id == product_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl StockNotifier for InMemoryStockNotifier {
    async fn stock_changed(&self, notice: StockNotice) -> std::result::Result<(), NotifyError> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_notify {
            return Err(NotifyError("sink unavailable".to_string()));
        }
        state.notices.push(notice.clone());
        // No receivers is fine; the notice is still recorded.
        let _ = self.sender.send(notice);
        Ok(())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<StockNotice>> {
        Some(self.sender.subscribe())
    }
}

/// Commits a confirmed sale by permanently reducing on-hand stock.
///
/// Not idempotent on its own: the order status state machine guarantees the
/// single invocation per order, not this service.
pub struct StockDecrementService<C, N>
where
    C: CatalogStore,
    N: StockNotifier,
{
    catalog: C,
    notifier: N,
    cache: Cache,
}

impl<C, N> StockDecrementService<C, N>
where
    C: CatalogStore,
    N: StockNotifier,
{
    /// Creates a stock decrement service.
    pub fn new(catalog: C, notifier: N, cache: Cache) -> Self {
        Self {
            catalog,
            notifier,
            cache,
        }
    }

    /// Permanently reduces stock by `quantity` for a confirmed order.
    ///
    /// The stock write is the one fatal step. Notification and cache
    /// invalidation are best-effort; the verification re-read only logs.
    /// Returns the new stock level.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_sale(
        &self,
        product_id: &ProductId,
        quantity: u32,
        order_id: &OrderId,
    ) -> Result<u32> {
        let versioned = self
            .catalog
            .fetch(product_id)
            .await?
            .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))?;

        let new_stock = versioned.product.stock.saturating_sub(quantity);
        self.catalog.set_stock(product_id, new_stock).await?;
        metrics::counter!("stock_decrements_total").increment(1);
        tracing::info!(%product_id, %order_id, quantity, new_stock, "stock committed for sale");

        let notice = StockNotice {
            id: Uuid::new_v4(),
            product_id: product_id.clone(),
            new_stock,
            order_id: order_id.clone(),
            at: Utc::now(),
        };
        if let Err(err) = self.notifier.stock_changed(notice).await {
            tracing::warn!(error = %err, %product_id, "stock-change notification failed");
        }

        self.cache
            .clear_prefix(&keys::availability_prefix(product_id))
            .await;
        self.cache.delete(&keys::stock(product_id)).await;

        match self.catalog.fetch(product_id).await {
            Ok(Some(reread)) if reread.product.stock != new_stock => {
                tracing::error!(
                    %product_id,
                    expected = new_stock,
                    actual = reread.product.stock,
                    "stock verification mismatch after decrement"
                );
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, %product_id, "stock verification re-read failed");
            }
        }

        Ok(new_stock)
    }
}
