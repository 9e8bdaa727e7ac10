//! Scheduled reconciliation of the ledger against the order store.
//!
//! Request-time correlation papers over the missing transaction boundary
//! between the catalog and the order store; this sweep walks the whole
//! catalog on a timer, drops lapsed ledger entries, and reports orders whose
//! session no longer holds a reservation so drift is visible instead of
//! silent.

use chrono::Utc;
use common::ProductId;
use store::{CatalogStore, OrderFilter, OrderStatus, OrderStore};

use crate::cleanup::{CleanupPolicy, CleanupService};
use crate::error::Result;

/// Totals from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Products examined.
    pub products_scanned: usize,
    /// Lapsed ledger entries dropped.
    pub entries_cleared: usize,
    /// Products with pending orders not backed by a live reservation.
    pub drifted_products: usize,
}

/// Periodic sweep over every product in the catalog.
pub struct ReconciliationSweep<C, O>
where
    C: CatalogStore,
    O: OrderStore,
{
    catalog: C,
    orders: O,
    cleanup: CleanupService<C>,
}

impl<C, O> ReconciliationSweep<C, O>
where
    C: CatalogStore,
    O: OrderStore,
{
    /// Creates a reconciliation sweep.
    pub fn new(catalog: C, orders: O, cleanup: CleanupService<C>) -> Self {
        Self {
            catalog,
            orders,
            cleanup,
        }
    }

    /// Runs one pass over the whole catalog.
    ///
    /// Per-product failures are logged and skipped; one stuck document must
    /// not stop the rest of the sweep.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        for product_id in self.catalog.list_ids().await? {
            report.products_scanned += 1;

            match self.cleanup.run(&product_id, &CleanupPolicy::Expired).await {
                Ok(outcome) => report.entries_cleared += outcome.cleared_count,
                Err(err) => {
                    tracing::warn!(error = %err, %product_id, "sweep cleanup failed, skipping");
                    continue;
                }
            }

            if self.detect_drift(&product_id).await {
                report.drifted_products += 1;
            }
        }

        metrics::counter!("reconciliation_sweeps_total").increment(1);
        tracing::info!(
            products = report.products_scanned,
            cleared = report.entries_cleared,
            drifted = report.drifted_products,
            "reconciliation sweep finished"
        );
        Ok(report)
    }

    /// Reports whether pending orders exist whose session holds no live
    /// reservation for this product.
    async fn detect_drift(&self, product_id: &ProductId) -> bool {
        let versioned = match self.catalog.fetch(product_id).await {
            Ok(Some(versioned)) => versioned,
            Ok(None) => return false,
            Err(err) => {
                tracing::warn!(error = %err, %product_id, "drift check fetch failed");
                return false;
            }
        };

        let filter = OrderFilter::new()
            .product(product_id.clone())
            .statuses(vec![OrderStatus::PaymentPending]);
        let pending = match self.orders.find(&filter).await {
            Ok(orders) => orders,
            Err(err) => {
                tracing::warn!(error = %err, %product_id, "drift check order lookup failed");
                return false;
            }
        };

        let now = Utc::now();
        let orphaned: Vec<_> = pending
            .iter()
            .filter(|order| {
                versioned
                    .product
                    .reservation_for(&order.session_id, now)
                    .is_none()
            })
            .collect();

        if orphaned.is_empty() {
            return false;
        }

        metrics::counter!("ledger_drift_products_total").increment(1);
        tracing::info!(
            %product_id,
            orphaned_orders = orphaned.len(),
            "pending orders without a live reservation"
        );
        true
    }
}
