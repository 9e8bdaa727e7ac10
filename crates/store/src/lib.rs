//! Document-store boundary for the storefront inventory system.
//!
//! The catalog store owns product documents (on-hand stock plus the embedded
//! reservation ledger); the order store owns order documents with their status
//! state machine. The two stores share no transaction boundary; ledger writes
//! are guarded per product by an optimistic [`Revision`] token instead.

mod catalog;
mod error;
mod memory;
mod order;
mod orders;
mod postgres;
mod product;
mod revision;

pub use catalog::{CatalogStore, PatchGuard};
pub use error::{Result, StoreError};
pub use memory::{InMemoryCatalogStore, InMemoryOrderStore};
pub use order::{Order, OrderFilter, OrderLine, OrderStatus};
pub use orders::OrderStore;
pub use postgres::{PostgresCatalogStore, PostgresOrderStore};
pub use product::{Product, Reservation, VersionedProduct};
pub use revision::Revision;
