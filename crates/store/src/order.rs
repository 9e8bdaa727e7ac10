//! Order document and its status state machine.

use chrono::{DateTime, Utc};
use common::{HolderId, Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Transitions are strictly forward-moving except `Canceled`, which is
/// terminal from any non-terminal state:
/// ```text
/// PaymentPending ──► PaymentConfirmed ──► Shipped ──► Complete
///        │                  │                │
///        └──────────────────┴────────────────┴──► Canceled
/// ```
/// The transition into `PaymentConfirmed` is the single point that triggers
/// the permanent stock decrement; the guard on this state machine is what
/// makes that decrement fire exactly once per order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created at checkout submission, awaiting payment.
    #[default]
    PaymentPending,

    /// Payment confirmed; stock has been permanently decremented.
    PaymentConfirmed,

    /// Handed to the carrier.
    Shipped,

    /// Delivered and settled (terminal state).
    Complete,

    /// Abandoned or refunded (terminal state).
    Canceled,
}

impl OrderStatus {
    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Complete | OrderStatus::Canceled)
    }

    /// Returns true if the order still counts toward pending demand.
    ///
    /// Availability reconciliation considers pending, confirmed, and canceled
    /// orders when correlating the ledger against the order store.
    pub fn is_reconcilable(&self) -> bool {
        matches!(
            self,
            OrderStatus::PaymentPending | OrderStatus::PaymentConfirmed | OrderStatus::Canceled
        )
    }

    /// Returns true if the state machine permits moving to `next`.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self, next) {
            // Cancellation is allowed from any non-terminal state.
            (from, OrderStatus::Canceled) => !from.is_terminal(),
            (OrderStatus::PaymentPending, OrderStatus::PaymentConfirmed) => true,
            (OrderStatus::PaymentConfirmed, OrderStatus::Shipped) => true,
            (OrderStatus::Shipped, OrderStatus::Complete) => true,
            _ => false,
        }
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PaymentPending => "payment_pending",
            OrderStatus::PaymentConfirmed => "payment_confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Complete => "complete",
            OrderStatus::Canceled => "canceled",
        }
    }

    /// Parses a wire name back into a status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "payment_pending" => Some(OrderStatus::PaymentPending),
            "payment_confirmed" => Some(OrderStatus::PaymentConfirmed),
            "shipped" => Some(OrderStatus::Shipped),
            "complete" => Some(OrderStatus::Complete),
            "canceled" => Some(OrderStatus::Canceled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A line item in an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Product the line refers to.
    pub product_id: ProductId,

    /// Units purchased.
    pub quantity: u32,

    /// Price per unit at checkout time.
    pub unit_price: Money,

    /// Optional size variant chosen by the shopper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(product_id: impl Into<ProductId>, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            unit_price,
            size: None,
        }
    }

    /// Sets the size variant.
    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }
}

/// Order document as stored in the order store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Human-referenceable identifier (`HIM-<timestamp>`).
    pub order_id: OrderId,

    /// Session that placed the order; links back to the reservation holder
    /// for ledger/order reconciliation.
    pub session_id: HolderId,

    /// Current status.
    pub status: OrderStatus,

    /// Purchased lines.
    pub items: Vec<OrderLine>,

    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates an order in `PaymentPending` at checkout submission.
    pub fn place(session_id: HolderId, items: Vec<OrderLine>, at: DateTime<Utc>) -> Self {
        Self {
            order_id: OrderId::generate(at),
            session_id,
            status: OrderStatus::PaymentPending,
            items,
            created_at: at,
        }
    }

    /// Returns the total quantity ordered for one product across all lines.
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.items
            .iter()
            .filter(|line| &line.product_id == product_id)
            .map(|line| line.quantity)
            .sum()
    }

    /// Returns true if any line references the product.
    pub fn references(&self, product_id: &ProductId) -> bool {
        self.items.iter().any(|line| &line.product_id == product_id)
    }
}

/// Filter for order-store lookups.
///
/// Matches on any line's product plus a status set, mirroring the queries
/// the availability reconciliation needs.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub product_id: Option<ProductId>,
    pub statuses: Option<Vec<OrderStatus>>,
    pub session_id: Option<HolderId>,
}

impl OrderFilter {
    /// Creates an empty filter matching everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to orders referencing the product.
    pub fn product(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    /// Restricts to orders in one of the given statuses.
    pub fn statuses(mut self, statuses: impl Into<Vec<OrderStatus>>) -> Self {
        self.statuses = Some(statuses.into());
        self
    }

    /// Restricts to orders placed by the session.
    pub fn session(mut self, session_id: HolderId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Convenience filter for the reconcilable statuses of one product.
    pub fn reconcilable_for(product_id: ProductId) -> Self {
        Self::new().product(product_id).statuses(vec![
            OrderStatus::PaymentPending,
            OrderStatus::PaymentConfirmed,
            OrderStatus::Canceled,
        ])
    }

    /// Returns true if the order matches this filter.
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(ref product_id) = self.product_id
            && !order.references(product_id)
        {
            return false;
        }
        if let Some(ref statuses) = self.statuses
            && !statuses.contains(&order.status)
        {
            return false;
        }
        if let Some(ref session_id) = self.session_id
            && &order.session_id != session_id
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn order_with(status: OrderStatus) -> Order {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut order = Order::place(
            HolderId::new("sess-1"),
            vec![OrderLine::new("p1", 2, Money::from_cents(4500))],
            at,
        );
        order.status = status;
        order
    }

    #[test]
    fn place_starts_payment_pending_with_him_id() {
        let order = order_with(OrderStatus::PaymentPending);
        assert!(order.order_id.is_well_formed());
        assert_eq!(order.status, OrderStatus::PaymentPending);
    }

    #[test]
    fn forward_transitions_allowed() {
        assert!(OrderStatus::PaymentPending.can_transition_to(OrderStatus::PaymentConfirmed));
        assert!(OrderStatus::PaymentConfirmed.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Complete));
    }

    #[test]
    fn backward_and_skipping_transitions_rejected() {
        assert!(!OrderStatus::PaymentConfirmed.can_transition_to(OrderStatus::PaymentPending));
        assert!(!OrderStatus::PaymentPending.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::PaymentPending.can_transition_to(OrderStatus::Complete));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::PaymentConfirmed));
    }

    #[test]
    fn confirm_cannot_fire_twice() {
        assert!(!OrderStatus::PaymentConfirmed.can_transition_to(OrderStatus::PaymentConfirmed));
    }

    #[test]
    fn cancel_allowed_from_non_terminal_states_only() {
        assert!(OrderStatus::PaymentPending.can_transition_to(OrderStatus::Canceled));
        assert!(OrderStatus::PaymentConfirmed.can_transition_to(OrderStatus::Canceled));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Canceled));
        assert!(!OrderStatus::Complete.can_transition_to(OrderStatus::Canceled));
        assert!(!OrderStatus::Canceled.can_transition_to(OrderStatus::Canceled));
    }

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Complete.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(!OrderStatus::PaymentPending.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
    }

    #[test]
    fn wire_names_roundtrip() {
        for status in [
            OrderStatus::PaymentPending,
            OrderStatus::PaymentConfirmed,
            OrderStatus::Shipped,
            OrderStatus::Complete,
            OrderStatus::Canceled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
        assert_eq!(OrderStatus::parse("refunded"), None);
    }

    #[test]
    fn quantity_of_sums_matching_lines() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let order = Order::place(
            HolderId::new("sess-1"),
            vec![
                OrderLine::new("p1", 2, Money::from_cents(4500)).with_size("M"),
                OrderLine::new("p1", 1, Money::from_cents(4500)).with_size("L"),
                OrderLine::new("p2", 4, Money::from_cents(900)),
            ],
            at,
        );

        assert_eq!(order.quantity_of(&ProductId::new("p1")), 3);
        assert_eq!(order.quantity_of(&ProductId::new("p2")), 4);
        assert_eq!(order.quantity_of(&ProductId::new("p3")), 0);
    }

    #[test]
    fn filter_matches_product_status_session() {
        let pending = order_with(OrderStatus::PaymentPending);
        let shipped = order_with(OrderStatus::Shipped);

        let filter = OrderFilter::reconcilable_for(ProductId::new("p1"));
        assert!(filter.matches(&pending));
        assert!(!filter.matches(&shipped));

        let other_product = OrderFilter::new().product(ProductId::new("p9"));
        assert!(!other_product.matches(&pending));

        let session = OrderFilter::new().session(HolderId::new("sess-1"));
        assert!(session.matches(&pending));
        let other_session = OrderFilter::new().session(HolderId::new("sess-2"));
        assert!(!other_session.matches(&pending));
    }
}
