use common::{OrderId, ProductId};
use thiserror::Error;

use crate::{OrderStatus, Revision};

/// Errors that can occur when interacting with the document stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A revision guard failed on a product write.
    /// The document changed between the read and the write.
    #[error(
        "Revision conflict for product {product_id}: expected revision {expected}, found {actual}"
    )]
    RevisionConflict {
        product_id: ProductId,
        expected: Revision,
        actual: Revision,
    },

    /// The product was not found in the catalog store.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The order was not found in the order store.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A status change violated the order state machine.
    #[error("Invalid status transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if a read-modify-write cycle may be retried on this error.
    pub fn is_retryable_conflict(&self) -> bool {
        matches!(self, StoreError::RevisionConflict { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
