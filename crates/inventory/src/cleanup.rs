//! Ledger cleanup and forced release.

use cache::Cache;
use chrono::Utc;
use common::{HolderId, ProductId};
use store::{CatalogStore, PatchGuard, Reservation, StoreError};

use crate::error::{InventoryError, Result};
use crate::{keys, ledger};

const MAX_PATCH_ATTEMPTS: u32 = 3;

/// Which ledger entries a cleanup pass removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupPolicy {
    /// Drop entries past their expiry (routine garbage collection).
    Expired,
    /// Drop every entry belonging to one holder (explicit release).
    Holder(HolderId),
    /// Drop all entries unconditionally (administrative unstick).
    All,
}

/// Counts reported by a cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupOutcome {
    pub original_count: usize,
    pub cleared_count: usize,
    pub remaining_count: usize,
}

/// Removes ledger entries under a revision guard.
///
/// The guard keeps a cleanup pass from clobbering a reservation that landed
/// between the read and the write; on conflict the pass re-reads and retries
/// like any other ledger writer.
pub struct CleanupService<C>
where
    C: CatalogStore,
{
    catalog: C,
    cache: Cache,
}

impl<C> CleanupService<C>
where
    C: CatalogStore,
{
    /// Creates a cleanup service.
    pub fn new(catalog: C, cache: Cache) -> Self {
        Self { catalog, cache }
    }

    /// Applies the policy to one product's ledger.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, product_id: &ProductId, policy: &CleanupPolicy) -> Result<CleanupOutcome> {
        for attempt in 1..=MAX_PATCH_ATTEMPTS {
            match self.try_run(product_id, policy).await {
                Ok(outcome) => {
                    if outcome.cleared_count > 0 {
                        metrics::counter!("cleanup_cleared_total")
                            .increment(outcome.cleared_count as u64);
                    }
                    return Ok(outcome);
                }
                Err(InventoryError::Store(StoreError::RevisionConflict { .. }))
                    if attempt < MAX_PATCH_ATTEMPTS =>
                {
                    tracing::debug!(%product_id, attempt, "cleanup write conflicted, retrying");
                }
                Err(InventoryError::Store(StoreError::RevisionConflict { .. })) => {
                    return Err(InventoryError::ConflictRetriesExhausted {
                        product_id: product_id.clone(),
                        attempts: MAX_PATCH_ATTEMPTS,
                    });
                }
                Err(err) => return Err(err),
            }
        }
        unreachable!("cleanup retry loop always returns")
    }

    async fn try_run(&self, product_id: &ProductId, policy: &CleanupPolicy) -> Result<CleanupOutcome> {
        let versioned = self
            .catalog
            .fetch(product_id)
            .await?
            .ok_or_else(|| InventoryError::ProductNotFound(product_id.clone()))?;
        let entries = &versioned.product.reservations;
        let original_count = entries.len();

        let retained: Vec<Reservation> = match policy {
            CleanupPolicy::Expired => ledger::without_expired(entries, Utc::now()),
            CleanupPolicy::Holder(holder) => ledger::without_holder(entries, holder),
            CleanupPolicy::All => Vec::new(),
        };
        let remaining_count = retained.len();
        let cleared_count = original_count - remaining_count;

        // Nothing to drop: skip the write so back-to-back passes don't churn
        // the revision and the cache.
        if cleared_count == 0 {
            return Ok(CleanupOutcome {
                original_count,
                cleared_count,
                remaining_count,
            });
        }

        self.catalog
            .patch_reservations(product_id, retained, PatchGuard::expect(versioned.revision))
            .await?;

        self.cache
            .clear_prefix(&keys::availability_prefix(product_id))
            .await;
        self.cache.delete(&keys::stock(product_id)).await;

        Ok(CleanupOutcome {
            original_count,
            cleared_count,
            remaining_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache::InMemoryCache;
    use chrono::Duration;
    use std::sync::Arc;
    use store::{InMemoryCatalogStore, Product};

    fn holder(s: &str) -> HolderId {
        HolderId::new(s)
    }

    async fn setup(reservations: Vec<Reservation>) -> (
        CleanupService<InMemoryCatalogStore>,
        InMemoryCatalogStore,
    ) {
        let catalog = InMemoryCatalogStore::new();
        let mut product = Product::new("p1", "Wool coat", 5);
        product.reservations = reservations;
        catalog.put(product).await.unwrap();
        let service = CleanupService::new(catalog.clone(), Cache::new(Arc::new(InMemoryCache::new())));
        (service, catalog)
    }

    fn live(holder_name: &str, quantity: u32) -> Reservation {
        Reservation::new(holder(holder_name), quantity, Utc::now() + Duration::minutes(30))
    }

    fn lapsed(holder_name: &str, quantity: u32) -> Reservation {
        Reservation::new(holder(holder_name), quantity, Utc::now() - Duration::minutes(1))
    }

    #[tokio::test]
    async fn expired_policy_only_drops_lapsed_entries() {
        let (service, catalog) = setup(vec![live("a", 2), lapsed("b", 1), lapsed("c", 3)]).await;
        let product = ProductId::new("p1");

        let outcome = service.run(&product, &CleanupPolicy::Expired).await.unwrap();
        assert_eq!(outcome.original_count, 3);
        assert_eq!(outcome.cleared_count, 2);
        assert_eq!(outcome.remaining_count, 1);

        let ledger = catalog.fetch(&product).await.unwrap().unwrap().product.reservations;
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].holder_id, holder("a"));
    }

    #[tokio::test]
    async fn expired_policy_is_idempotent() {
        let (service, _) = setup(vec![live("a", 2), lapsed("b", 1)]).await;
        let product = ProductId::new("p1");

        let first = service.run(&product, &CleanupPolicy::Expired).await.unwrap();
        assert_eq!(first.cleared_count, 1);

        let second = service.run(&product, &CleanupPolicy::Expired).await.unwrap();
        assert_eq!(second.cleared_count, 0);
        assert_eq!(second.original_count, 1);
        assert_eq!(second.remaining_count, 1);
    }

    #[tokio::test]
    async fn holder_policy_releases_one_session() {
        let (service, catalog) = setup(vec![live("a", 2), live("b", 1)]).await;
        let product = ProductId::new("p1");

        let outcome = service
            .run(&product, &CleanupPolicy::Holder(holder("a")))
            .await
            .unwrap();
        assert_eq!(outcome.cleared_count, 1);
        assert_eq!(outcome.remaining_count, 1);

        let ledger = catalog.fetch(&product).await.unwrap().unwrap().product.reservations;
        assert_eq!(ledger[0].holder_id, holder("b"));
    }

    #[tokio::test]
    async fn clear_all_unsticks_everything() {
        let (service, catalog) = setup(vec![live("a", 2), live("b", 1), lapsed("c", 4)]).await;
        let product = ProductId::new("p1");

        let outcome = service.run(&product, &CleanupPolicy::All).await.unwrap();
        assert_eq!(outcome.original_count, 3);
        assert_eq!(outcome.cleared_count, 3);
        assert_eq!(outcome.remaining_count, 0);

        let ledger = catalog.fetch(&product).await.unwrap().unwrap().product.reservations;
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn no_op_pass_does_not_bump_the_revision() {
        let (service, catalog) = setup(vec![live("a", 2)]).await;
        let product = ProductId::new("p1");

        let before = catalog.fetch(&product).await.unwrap().unwrap().revision;
        service.run(&product, &CleanupPolicy::Expired).await.unwrap();
        let after = catalog.fetch(&product).await.unwrap().unwrap().revision;

        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let (service, _) = setup(vec![]).await;
        let result = service
            .run(&ProductId::new("ghost"), &CleanupPolicy::All)
            .await;
        assert!(matches!(result, Err(InventoryError::ProductNotFound(_))));
    }
}
