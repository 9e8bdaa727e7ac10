//! Product document and its embedded reservation ledger.

use chrono::{DateTime, Utc};
use common::{HolderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::Revision;

/// A soft reservation held by one shopper session.
///
/// `quantity` is the total number of units this holder currently wants, not
/// an increment over a previous entry. Entries past `expires_at` are logically
/// dead; reads filter them out and the next write to the product drops them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Session that holds the claim.
    pub holder_id: HolderId,

    /// Total units claimed by the holder.
    pub quantity: u32,

    /// Instant the claim lapses.
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    /// Creates a new reservation entry.
    pub fn new(holder_id: HolderId, quantity: u32, expires_at: DateTime<Utc>) -> Self {
        Self {
            holder_id,
            quantity,
            expires_at,
        }
    }

    /// Returns true if the entry has not lapsed at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Product document as stored in the catalog.
///
/// The reservation ledger is embedded in the document so that a single
/// guarded write replaces the whole ledger; the list is append/replace/filter
/// only and never arbitrarily reordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Document key.
    pub id: ProductId,

    /// Display title.
    pub title: String,

    /// On-hand physical quantity; decremented only on confirmed sale.
    pub stock: u32,

    /// Soft-reservation ledger.
    #[serde(default)]
    pub reservations: Vec<Reservation>,
}

impl Product {
    /// Creates a product with an empty ledger.
    pub fn new(id: impl Into<ProductId>, title: impl Into<String>, stock: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            stock,
            reservations: Vec::new(),
        }
    }

    /// Returns the ledger entries that have not lapsed at `now`.
    pub fn live_reservations(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter().filter(move |r| r.is_live(now))
    }

    /// Returns the caller's live ledger entry, if any.
    pub fn reservation_for(&self, holder: &HolderId, now: DateTime<Utc>) -> Option<&Reservation> {
        self.live_reservations(now).find(|r| &r.holder_id == holder)
    }
}

/// A product document together with the revision it was read at.
#[derive(Debug, Clone)]
pub struct VersionedProduct {
    pub product: Product,
    pub revision: Revision,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn holder(s: &str) -> HolderId {
        HolderId::new(s)
    }

    #[test]
    fn reservation_liveness() {
        let now = Utc::now();
        let live = Reservation::new(holder("a"), 1, now + Duration::minutes(5));
        let dead = Reservation::new(holder("b"), 1, now - Duration::seconds(1));

        assert!(live.is_live(now));
        assert!(!dead.is_live(now));
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let at_boundary = Reservation::new(holder("a"), 1, now);
        assert!(!at_boundary.is_live(now));
    }

    #[test]
    fn live_reservations_filters_expired() {
        let now = Utc::now();
        let mut product = Product::new("p1", "Wool coat", 5);
        product.reservations = vec![
            Reservation::new(holder("a"), 2, now + Duration::minutes(10)),
            Reservation::new(holder("b"), 1, now - Duration::minutes(1)),
        ];

        let live: Vec<_> = product.live_reservations(now).collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].holder_id, holder("a"));
    }

    #[test]
    fn reservation_for_ignores_expired_entry() {
        let now = Utc::now();
        let mut product = Product::new("p1", "Wool coat", 5);
        product.reservations = vec![Reservation::new(holder("a"), 2, now - Duration::minutes(1))];

        assert!(product.reservation_for(&holder("a"), now).is_none());
    }

    #[test]
    fn document_serialization_roundtrip() {
        let now = Utc::now();
        let mut product = Product::new("p1", "Wool coat", 5);
        product.reservations = vec![Reservation::new(holder("a"), 2, now + Duration::hours(1))];

        let json = serde_json::to_string(&product).unwrap();
        let back: Product = serde_json::from_str(&json).unwrap();
        assert_eq!(back, product);
    }

    #[test]
    fn missing_reservations_field_defaults_empty() {
        let product: Product =
            serde_json::from_str(r#"{"id":"p1","title":"Wool coat","stock":3}"#).unwrap();
        assert!(product.reservations.is_empty());
    }
}
