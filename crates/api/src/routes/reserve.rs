//! Reservation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use common::{HolderId, ProductId};
use inventory::{InventoryError, ReservationHorizon, StockNotifier};
use serde::{Deserialize, Serialize};
use store::{CatalogStore, OrderStore};

use crate::error::ApiError;
use crate::rate_limit::caller_key;
use crate::routes::{AppState, throttle};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    pub session_id: String,
    pub quantity: u32,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub is_update: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_stock: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /reserve/:product_id — short cart hold.
#[tracing::instrument(skip(state, req, headers))]
pub async fn cart<C, O, N>(
    State(state): State<Arc<AppState<C, O, N>>>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ReserveRequest>,
) -> Result<Json<ReserveResponse>, ApiError>
where
    C: CatalogStore + 'static,
    O: OrderStore + 'static,
    N: StockNotifier + 'static,
{
    reserve_with_horizon(state, product_id, headers, req, ReservationHorizon::Cart).await
}

/// POST /checkout-reserve/:product_id — same contract, 24h hold.
#[tracing::instrument(skip(state, req, headers))]
pub async fn checkout<C, O, N>(
    State(state): State<Arc<AppState<C, O, N>>>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ReserveRequest>,
) -> Result<Json<ReserveResponse>, ApiError>
where
    C: CatalogStore + 'static,
    O: OrderStore + 'static,
    N: StockNotifier + 'static,
{
    reserve_with_horizon(state, product_id, headers, req, ReservationHorizon::Checkout).await
}

async fn reserve_with_horizon<C, O, N>(
    state: Arc<AppState<C, O, N>>,
    product_id: String,
    headers: HeaderMap,
    req: ReserveRequest,
    horizon: ReservationHorizon,
) -> Result<Json<ReserveResponse>, ApiError>
where
    C: CatalogStore + 'static,
    O: OrderStore + 'static,
    N: StockNotifier + 'static,
{
    throttle(
        &state.rate_limiter,
        "reserve",
        &caller_key(&headers, Some(&req.session_id)),
    )
    .await?;

    // The size variant only matters to the client's cart rendering; the
    // ledger holds units per product.
    tracing::debug!(size = ?req.size, "reserve requested");

    let result = state
        .reservations
        .reserve(
            &ProductId::new(product_id),
            &HolderId::new(req.session_id),
            req.quantity,
            horizon,
            req.is_update.unwrap_or(false),
        )
        .await;

    match result {
        Ok(receipt) => Ok(Json(ReserveResponse {
            success: true,
            reservation_id: Some(receipt.reservation_id),
            reserved_until: Some(receipt.reserved_until),
            available_stock: Some(receipt.available_stock),
            error: None,
        })),
        // A business-rule rejection is a 200 with success:false so the
        // storefront can render it inline next to the buy button.
        Err(InventoryError::InsufficientStock {
            requested,
            available,
            pending,
        }) => Ok(Json(ReserveResponse {
            success: false,
            reservation_id: None,
            reserved_until: None,
            available_stock: Some(available),
            error: Some(rejection_message(requested, available, pending)),
        })),
        Err(err) => Err(err.into()),
    }
}

/// Shopper-facing rejection line: specific enough to decide whether to retry,
/// lower the quantity, or give up.
fn rejection_message(requested: u32, available: u32, pending: u32) -> String {
    let mut message = if available == 0 {
        "This item is currently reserved by another customer".to_string()
    } else {
        format!("Only {available} available right now (requested {requested})")
    };
    if pending > 0 {
        message.push_str(&format!(", {pending} held by pending orders"));
    }
    message
}
