//! Availability calculation across the ledger, pending orders, and stock.

use std::collections::HashMap;
use std::time::Duration;

use cache::Cache;
use chrono::{DateTime, Utc};
use common::{HolderId, ProductId};
use serde::{Deserialize, Serialize};
use store::{CatalogStore, Order, OrderFilter, OrderStore, Reservation};

use crate::error::{InventoryError, Result};
use crate::{keys, ledger};

/// Derived view of one product's sellable stock from one caller's side.
///
/// Computed fresh per request and cached briefly; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySnapshot {
    /// On-hand physical quantity.
    pub stock: u32,

    /// Units still claimable after all reservations and pending orders.
    pub available_stock: u32,

    /// Units the caller currently holds in the ledger.
    pub reserved_by_caller: u32,

    /// Units held by every other session, ledger and pending orders combined.
    pub reserved_by_others: u32,

    /// True when on-hand stock itself is zero.
    pub is_out_of_stock: bool,

    /// True when the caller could add this product to their cart right now.
    pub available: bool,

    /// Shopper-facing status line.
    pub message: String,
}

/// Sums each session's pending demand for one product.
pub fn pending_by_session(orders: &[Order], product_id: &ProductId) -> HashMap<HolderId, u32> {
    let mut pending: HashMap<HolderId, u32> = HashMap::new();
    for order in orders {
        let quantity = order.quantity_of(product_id);
        if quantity > 0 {
            *pending.entry(order.session_id.clone()).or_default() += quantity;
        }
    }
    pending
}

/// Folds stock, live reservations, and per-session pending demand into a
/// single availability snapshot for `caller`.
///
/// A ledger entry and a pending order from the same session are presumed to
/// record the same purchase intent twice; the pair contributes
/// `max(reservation, order)` so the intent is neither double-counted nor
/// undercounted when the order asks for more than the original reservation.
/// Uncorrelated entries on either side count in full.
pub fn compute_availability(
    stock: u32,
    reservations: &[Reservation],
    pending: &HashMap<HolderId, u32>,
    caller: &HolderId,
    now: DateTime<Utc>,
) -> AvailabilitySnapshot {
    let live = ledger::live_entries(reservations, now);

    let mut total_reserved: u32 = 0;
    for entry in &live {
        let contribution = match pending.get(&entry.holder_id) {
            Some(ordered) => entry.quantity.max(*ordered),
            None => entry.quantity,
        };
        total_reserved += contribution;
    }
    for (session, ordered) in pending {
        if !live.iter().any(|r| &r.holder_id == session) {
            total_reserved += ordered;
        }
    }

    let reserved_by_caller = ledger::entry_for(&live, caller, now)
        .map(|r| r.quantity)
        .unwrap_or(0);
    let caller_contribution = if reserved_by_caller > 0 {
        reserved_by_caller.max(pending.get(caller).copied().unwrap_or(0))
    } else {
        pending.get(caller).copied().unwrap_or(0)
    };
    let reserved_by_others = total_reserved - caller_contribution;

    let available_stock = stock.saturating_sub(total_reserved);
    let is_out_of_stock = stock == 0;

    // Out-of-stock beats everything; a holder with a live claim always sees
    // themselves as available even when others exhausted the rest.
    let (available, message) = if is_out_of_stock {
        (false, "Out of stock".to_string())
    } else if reserved_by_caller > 0 {
        (true, format!("{reserved_by_caller} reserved by you"))
    } else if available_stock == 0 {
        (false, "Fully reserved by another customer".to_string())
    } else if reserved_by_others > 0 {
        (true, format!("Partially reserved, {available_stock} available"))
    } else {
        (true, format!("{stock} in stock"))
    };

    AvailabilitySnapshot {
        stock,
        available_stock,
        reserved_by_caller,
        reserved_by_others,
        is_out_of_stock,
        available,
        message,
    }
}

/// Read side of the inventory: availability lookups with a short-TTL
/// read-through cache in front of the catalog and order stores.
pub struct AvailabilityService<C, O>
where
    C: CatalogStore,
    O: OrderStore,
{
    catalog: C,
    orders: O,
    cache: Cache,
    ttl: Duration,
}

impl<C, O> AvailabilityService<C, O>
where
    C: CatalogStore,
    O: OrderStore,
{
    /// Creates an availability service caching snapshots for `ttl`.
    pub fn new(catalog: C, orders: O, cache: Cache, ttl: Duration) -> Self {
        Self {
            catalog,
            orders,
            cache,
            ttl,
        }
    }

    /// Computes (or serves from cache) the caller's availability snapshot.
    #[tracing::instrument(skip(self))]
    pub async fn check(
        &self,
        product_id: &ProductId,
        caller: &HolderId,
    ) -> Result<AvailabilitySnapshot> {
        if caller.is_empty() {
            return Err(InventoryError::EmptyHolder);
        }

        let key = keys::availability(product_id, caller);
        if let Some(snapshot) = self.cache.get_json::<AvailabilitySnapshot>(&key).await {
            return Ok(snapshot);
        }

        let versioned = self
            .catalog
            .fetch(product_id)
            .await?
            .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))?;

        let pending = self.pending_demand(product_id).await;
        let snapshot = compute_availability(
            versioned.product.stock,
            &versioned.product.reservations,
            &pending,
            caller,
            Utc::now(),
        );

        self.cache.set_json(&key, &snapshot, self.ttl).await;
        Ok(snapshot)
    }

    /// Looks up pending demand, degrading to "no pending orders" if the order
    /// store is unreachable. That leans toward availability rather than
    /// correctness; the tradeoff is deliberate and logged.
    async fn pending_demand(&self, product_id: &ProductId) -> HashMap<HolderId, u32> {
        let filter = OrderFilter::reconcilable_for(product_id.clone());
        match self.orders.find(&filter).await {
            Ok(orders) => pending_by_session(&orders, product_id),
            Err(err) => {
                metrics::counter!("order_lookup_failures_total").increment(1);
                tracing::warn!(
                    error = %err,
                    %product_id,
                    "order store lookup failed, assuming zero pending orders"
                );
                HashMap::new()
            }
        }
    }
}
