//! Checkout submission and the order-status flow.

use std::collections::BTreeMap;

use chrono::Utc;
use common::{HolderId, OrderId, ProductId};
use store::{CatalogStore, Order, OrderLine, OrderStatus, OrderStore};

use crate::cleanup::{CleanupPolicy, CleanupService};
use crate::decrement::{StockDecrementService, StockNotifier};
use crate::error::{InventoryError, Result};
use crate::reserve::{ReservationHorizon, ReservationService};

/// Ties orders to the ledger: checkout submission extends the session's
/// reservations, and the transition into `payment_confirmed` commits the sale.
///
/// Status changes themselves are admin-driven; this service only enforces the
/// state machine and hangs the decrement off the one transition that sells.
pub struct CheckoutService<C, O, N>
where
    C: CatalogStore,
    O: OrderStore,
    N: StockNotifier,
{
    orders: O,
    reservations: ReservationService<C, O>,
    decrement: StockDecrementService<C, N>,
    cleanup: CleanupService<C>,
}

impl<C, O, N> CheckoutService<C, O, N>
where
    C: CatalogStore,
    O: OrderStore,
    N: StockNotifier,
{
    /// Creates a checkout service from the underlying inventory services.
    pub fn new(
        orders: O,
        reservations: ReservationService<C, O>,
        decrement: StockDecrementService<C, N>,
        cleanup: CleanupService<C>,
    ) -> Self {
        Self {
            orders,
            reservations,
            decrement,
            cleanup,
        }
    }

    /// Submits a checkout: extends the session's reservations to the checkout
    /// horizon, then records the order in `payment_pending`.
    ///
    /// Reservation extension runs first so a shopper whose claim no longer
    /// fits fails before an order exists.
    #[tracing::instrument(skip(self, lines))]
    pub async fn place_order(&self, session: &HolderId, lines: Vec<OrderLine>) -> Result<Order> {
        if session.is_empty() {
            return Err(InventoryError::EmptyHolder);
        }
        if lines.is_empty() {
            return Err(InventoryError::NoItems);
        }
        if let Some(line) = lines.iter().find(|line| line.quantity == 0) {
            return Err(InventoryError::InvalidQuantity {
                quantity: line.quantity,
            });
        }

        for (product_id, quantity) in product_quantities(&lines) {
            self.reservations
                .reserve(&product_id, session, quantity, ReservationHorizon::Checkout, true)
                .await?;
        }

        let order = Order::place(session.clone(), lines, Utc::now());
        self.orders.insert(order.clone()).await?;
        metrics::counter!("orders_placed_total").increment(1);
        tracing::info!(order_id = %order.order_id, %session, "order placed");

        Ok(order)
    }

    /// Moves an order to a new status.
    ///
    /// The store's state-machine guard rejects repeats and backward moves, so
    /// the decrement hooked to `payment_confirmed` cannot fire twice for one
    /// order. Ledger release after a confirmation or cancellation is
    /// best-effort: the entries would lapse on their own anyway.
    #[tracing::instrument(skip(self))]
    pub async fn transition(&self, order_id: &OrderId, next: OrderStatus) -> Result<Order> {
        let order = self.orders.transition(order_id, next).await?;

        match next {
            OrderStatus::PaymentConfirmed => {
                for (product_id, quantity) in product_quantities(&order.items) {
                    self.decrement
                        .confirm_sale(&product_id, quantity, order_id)
                        .await?;
                    self.release(&product_id, &order.session_id).await;
                }
            }
            OrderStatus::Canceled => {
                for (product_id, _) in product_quantities(&order.items) {
                    self.release(&product_id, &order.session_id).await;
                }
            }
            _ => {}
        }

        Ok(order)
    }

    async fn release(&self, product_id: &ProductId, session: &HolderId) {
        let policy = CleanupPolicy::Holder(session.clone());
        if let Err(err) = self.cleanup.run(product_id, &policy).await {
            tracing::warn!(error = %err, %product_id, %session, "ledger release failed");
        }
    }
}

/// Aggregates line quantities per product, in a stable order.
fn product_quantities(lines: &[OrderLine]) -> Vec<(ProductId, u32)> {
    let mut totals: BTreeMap<String, (ProductId, u32)> = BTreeMap::new();
    for line in lines {
        let entry = totals
            .entry(line.product_id.as_str().to_string())
            .or_insert_with(|| (line.product_id.clone(), 0));
        entry.1 += line.quantity;
    }
    totals.into_values().collect()
}
