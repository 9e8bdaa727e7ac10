use async_trait::async_trait;
use common::ProductId;

use crate::{Product, Reservation, Result, Revision, VersionedProduct};

/// Guard for product writes.
///
/// With an expected revision set, the write only succeeds if the document is
/// still at that revision; otherwise the store returns
/// [`StoreError::RevisionConflict`](crate::StoreError::RevisionConflict) and
/// the caller must re-read and retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchGuard {
    /// Expected revision of the product document.
    /// If None, the write is unguarded (last writer wins).
    pub expected_revision: Option<Revision>,
}

impl PatchGuard {
    /// Creates an unguarded write.
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates a guard expecting the document at a specific revision.
    pub fn expect(revision: Revision) -> Self {
        Self {
            expected_revision: Some(revision),
        }
    }
}

/// Read/write interface to the catalog's product documents.
///
/// The catalog itself (titles, imagery, pricing copy) is an external system;
/// this trait covers only what inventory needs: fetching a product with its
/// revision, rewriting the reservation ledger, and committing stock changes.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fetches a product document with the revision it was read at.
    ///
    /// Returns None if the product does not exist.
    async fn fetch(&self, product_id: &ProductId) -> Result<Option<VersionedProduct>>;

    /// Creates or fully replaces a product document.
    ///
    /// Returns the revision assigned to the write.
    async fn put(&self, product: Product) -> Result<Revision>;

    /// Replaces the product's reservation ledger in a single write.
    ///
    /// Fails with `RevisionConflict` if the guard's expected revision no
    /// longer matches, and `ProductNotFound` if the product does not exist.
    /// Returns the new revision.
    async fn patch_reservations(
        &self,
        product_id: &ProductId,
        reservations: Vec<Reservation>,
        guard: PatchGuard,
    ) -> Result<Revision>;

    /// Sets the on-hand stock of a product.
    ///
    /// Stock changes are permanent and unguarded: the confirmed sale has
    /// already happened, so the write must not lose to a ledger race.
    async fn set_stock(&self, product_id: &ProductId, stock: u32) -> Result<Revision>;

    /// Lists all product IDs known to the catalog.
    ///
    /// Used by the reconciliation sweep; not a shopper-facing query.
    async fn list_ids(&self) -> Result<Vec<ProductId>>;
}
