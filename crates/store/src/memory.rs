use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, ProductId};
use tokio::sync::RwLock;

use crate::{
    CatalogStore, Order, OrderFilter, OrderStatus, OrderStore, PatchGuard, Product, Reservation,
    Result, Revision, StoreError, VersionedProduct,
};

/// In-memory catalog store.
///
/// Backs tests and single-process deployments with the same interface as the
/// PostgreSQL implementation, including revision-guard semantics.
#[derive(Clone, Default)]
pub struct InMemoryCatalogStore {
    products: Arc<RwLock<HashMap<ProductId, (Product, Revision)>>>,
}

impl InMemoryCatalogStore {
    /// Creates a new empty catalog store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of products stored.
    pub async fn product_count(&self) -> usize {
        self.products.read().await.len()
    }

    /// Clears all products.
    pub async fn clear(&self) {
        self.products.write().await.clear();
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn fetch(&self, product_id: &ProductId) -> Result<Option<VersionedProduct>> {
        let products = self.products.read().await;
        Ok(products
            .get(product_id)
            .map(|(product, revision)| VersionedProduct {
                product: product.clone(),
                revision: *revision,
            }))
    }

    async fn put(&self, product: Product) -> Result<Revision> {
        let mut products = self.products.write().await;
        let revision = products
            .get(&product.id)
            .map(|(_, r)| r.next())
            .unwrap_or_else(Revision::first);
        products.insert(product.id.clone(), (product, revision));
        Ok(revision)
    }

    async fn patch_reservations(
        &self,
        product_id: &ProductId,
        reservations: Vec<Reservation>,
        guard: PatchGuard,
    ) -> Result<Revision> {
        let mut products = self.products.write().await;
        let (product, revision) = products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;

        if let Some(expected) = guard.expected_revision
            && *revision != expected
        {
            return Err(StoreError::RevisionConflict {
                product_id: product_id.clone(),
                expected,
                actual: *revision,
            });
        }

        product.reservations = reservations;
        *revision = revision.next();
        Ok(*revision)
    }

    async fn set_stock(&self, product_id: &ProductId, stock: u32) -> Result<Revision> {
        let mut products = self.products.write().await;
        let (product, revision) = products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;

        product.stock = stock;
        *revision = revision.next();
        Ok(*revision)
    }

    async fn list_ids(&self) -> Result<Vec<ProductId>> {
        let products = self.products.read().await;
        let mut ids: Vec<_> = products.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }
}

/// In-memory order store.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        orders.insert(order.order_id.clone(), order);
        Ok(())
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(order_id).cloned())
    }

    async fn find(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut matched: Vec<_> = orders
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matched)
    }

    async fn transition(&self, order_id: &OrderId, next: OrderStatus) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::OrderNotFound(order_id.clone()))?;

        if !order.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                order_id: order_id.clone(),
                from: order.status,
                to: next,
            });
        }

        order.status = next;
        Ok(order.clone())
    }
}
