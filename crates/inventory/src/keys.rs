//! Cache key layout for availability and stock entries.

use common::{HolderId, ProductId};

/// Key for one caller's availability snapshot.
pub fn availability(product_id: &ProductId, holder: &HolderId) -> String {
    format!("availability:{product_id}:{holder}")
}

/// Prefix covering every caller's availability snapshot for a product.
pub fn availability_prefix(product_id: &ProductId) -> String {
    format!("availability:{product_id}:")
}

/// Key for a product's raw stock entry.
pub fn stock(product_id: &ProductId) -> String {
    format!("stock:{product_id}")
}
