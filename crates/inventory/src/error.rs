//! Inventory error types.

use common::ProductId;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during inventory operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The product was not found in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The requested quantity exceeds what is available to this caller.
    /// `pending` is the portion held by other sessions' pending orders.
    #[error(
        "Insufficient stock: {available} available for request of {requested} ({pending} held by pending orders)"
    )]
    InsufficientStock {
        requested: u32,
        available: u32,
        pending: u32,
    },

    /// Quantity must be a positive integer.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// The caller did not supply a session token.
    #[error("Session ID is required")]
    EmptyHolder,

    /// An order was submitted with no items.
    #[error("Order has no items")]
    NoItems,

    /// A guarded ledger write kept losing to concurrent writers.
    #[error("Ledger write for {product_id} still conflicting after {attempts} attempts")]
    ConflictRetriesExhausted { product_id: ProductId, attempts: u32 },

    /// An error occurred in a document store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for inventory operations.
pub type Result<T> = std::result::Result<T, InventoryError>;
