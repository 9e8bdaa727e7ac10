//! Shared types for the storefront inventory system.

mod types;

pub use types::{HolderId, Money, OrderId, ProductId};
