//! Soft-reservation writes against the product ledger.

use cache::Cache;
use chrono::{DateTime, Duration, Utc};
use common::{HolderId, ProductId};
use store::{CatalogStore, OrderFilter, OrderStore, PatchGuard, StoreError};

use crate::availability::pending_by_session;
use crate::error::{InventoryError, Result};
use crate::{keys, ledger};

/// How many times a guarded ledger write is retried after losing a race.
/// Each retry re-reads the document and re-derives availability from scratch.
const MAX_PATCH_ATTEMPTS: u32 = 3;

/// How long a successful reservation holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationHorizon {
    /// Short hold for "added to cart".
    Cart,
    /// Long hold for "entered checkout".
    Checkout,
}

/// Outcome of a successful reservation write.
#[derive(Debug, Clone)]
pub struct ReservationReceipt {
    /// Synthetic identifier (`holder-product-timestamp`) for client-side
    /// tracking only; the ledger is keyed by holder, not by this.
    pub reservation_id: String,

    /// Instant the hold lapses.
    pub reserved_until: DateTime<Utc>,

    /// Units left for other shoppers after this write.
    pub available_stock: u32,
}

/// The mutating side of the inventory: validates a requested quantity against
/// current availability, then atomically rewrites the caller's ledger entry.
pub struct ReservationService<C, O>
where
    C: CatalogStore,
    O: OrderStore,
{
    catalog: C,
    orders: O,
    cache: Cache,
    cart_horizon: Duration,
    checkout_horizon: Duration,
}

impl<C, O> ReservationService<C, O>
where
    C: CatalogStore,
    O: OrderStore,
{
    /// Creates a reservation service with the given hold horizons.
    pub fn new(
        catalog: C,
        orders: O,
        cache: Cache,
        cart_horizon: Duration,
        checkout_horizon: Duration,
    ) -> Self {
        Self {
            catalog,
            orders,
            cache,
            cart_horizon,
            checkout_horizon,
        }
    }

    fn horizon_duration(&self, horizon: ReservationHorizon) -> Duration {
        match horizon {
            ReservationHorizon::Cart => self.cart_horizon,
            ReservationHorizon::Checkout => self.checkout_horizon,
        }
    }

    /// Claims `quantity` total units of a product for the holder.
    ///
    /// With `is_update` set and an existing entry present, only the delta over
    /// the current claim is validated against what others have left free;
    /// otherwise the full quantity must fit. The ledger write is guarded by
    /// the product revision read at the start of the attempt and retried a
    /// bounded number of times when a concurrent writer wins the race.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(
        &self,
        product_id: &ProductId,
        holder: &HolderId,
        quantity: u32,
        horizon: ReservationHorizon,
        is_update: bool,
    ) -> Result<ReservationReceipt> {
        if holder.is_empty() {
            return Err(InventoryError::EmptyHolder);
        }
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity { quantity });
        }

        for attempt in 1..=MAX_PATCH_ATTEMPTS {
            match self
                .try_reserve(product_id, holder, quantity, horizon, is_update)
                .await
            {
                Ok(receipt) => {
                    metrics::counter!("reservations_total").increment(1);
                    return Ok(receipt);
                }
                Err(InventoryError::Store(StoreError::RevisionConflict { .. }))
                    if attempt < MAX_PATCH_ATTEMPTS =>
                {
                    metrics::counter!("reservation_conflicts_total").increment(1);
                    tracing::debug!(%product_id, %holder, attempt, "ledger write conflicted, retrying");
                }
                Err(InventoryError::Store(StoreError::RevisionConflict { .. })) => {
                    metrics::counter!("reservation_conflicts_total").increment(1);
                    return Err(InventoryError::ConflictRetriesExhausted {
                        product_id: product_id.clone(),
                        attempts: MAX_PATCH_ATTEMPTS,
                    });
                }
                Err(err) => {
                    if matches!(err, InventoryError::InsufficientStock { .. }) {
                        metrics::counter!("reservations_rejected_total").increment(1);
                    }
                    return Err(err);
                }
            }
        }
        unreachable!("reservation retry loop always returns")
    }

    /// One guarded read-modify-write attempt.
    async fn try_reserve(
        &self,
        product_id: &ProductId,
        holder: &HolderId,
        quantity: u32,
        horizon: ReservationHorizon,
        is_update: bool,
    ) -> Result<ReservationReceipt> {
        // Always a fresh read: deciding on a cached snapshot would let two
        // shoppers claim the same last unit.
        let versioned = self
            .catalog
            .fetch(product_id)
            .await?
            .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))?;
        let product = &versioned.product;
        let now = Utc::now();

        let existing = product.reservation_for(holder, now).cloned();
        let pending = self.pending_demand(product_id).await;

        // Mirror of the availability fold, taken from the "others" side:
        // every other holder's live claim plus pending orders from sessions
        // that hold no live claim.
        let others_live: u32 = product
            .live_reservations(now)
            .filter(|r| &r.holder_id != holder)
            .map(|r| r.quantity)
            .sum();
        let uncorrelated_pending: u32 = pending
            .iter()
            .filter(|(session, _)| {
                *session != holder && product.reservation_for(session, now).is_none()
            })
            .map(|(_, ordered)| *ordered)
            .sum();
        let reserved_by_others = others_live + uncorrelated_pending;
        let available_for_caller = product.stock.saturating_sub(reserved_by_others);

        let needed = match (&existing, is_update) {
            (Some(current), true) => quantity.saturating_sub(current.quantity),
            _ => quantity,
        };
        if needed > available_for_caller {
            return Err(InventoryError::InsufficientStock {
                requested: quantity,
                available: available_for_caller,
                pending: uncorrelated_pending,
            });
        }

        let reserved_until = now + self.horizon_duration(horizon);
        let updated = ledger::upsert(&product.reservations, holder, quantity, reserved_until, now);

        self.catalog
            .patch_reservations(product_id, updated, PatchGuard::expect(versioned.revision))
            .await?;

        self.invalidate(product_id).await;

        Ok(ReservationReceipt {
            reservation_id: format!("{holder}-{product_id}-{}", now.timestamp_millis()),
            reserved_until,
            available_stock: product
                .stock
                .saturating_sub(reserved_by_others.saturating_add(quantity)),
        })
    }

    async fn pending_demand(
        &self,
        product_id: &ProductId,
    ) -> std::collections::HashMap<HolderId, u32> {
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
                std::collections::HashMap::new()
            }
        }
    }

    async fn invalidate(&self, product_id: &ProductId) {
        self.cache
            .clear_prefix(&keys::availability_prefix(product_id))
            .await;
        self.cache.delete(&keys::stock(product_id)).await;
    }
}
