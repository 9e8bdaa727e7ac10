use async_trait::async_trait;
use common::OrderId;

use crate::{Order, OrderFilter, OrderStatus, Result};

/// Read/write interface to the order documents.
///
/// Orders live in a separate transactional store from the catalog; nothing
/// here shares an atomic unit with ledger writes. All implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order.
    async fn insert(&self, order: Order) -> Result<()>;

    /// Fetches an order by ID. Returns None if it does not exist.
    async fn get(&self, order_id: &OrderId) -> Result<Option<Order>>;

    /// Returns all orders matching the filter.
    async fn find(&self, filter: &OrderFilter) -> Result<Vec<Order>>;

    /// Moves an order to a new status, enforcing the state machine.
    ///
    /// Fails with `InvalidTransition` if the order's current status does not
    /// permit the move. This guard is the de-duplication point for the stock
    /// decrement: a second attempt to confirm payment is rejected here.
    /// Returns the updated order.
    async fn transition(&self, order_id: &OrderId, next: OrderStatus) -> Result<Order>;
}
