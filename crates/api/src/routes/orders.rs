//! Checkout submission and admin order-status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::{HolderId, Money, OrderId};
use inventory::StockNotifier;
use serde::{Deserialize, Serialize};
use store::{CatalogStore, Order, OrderLine, OrderStatus, OrderStore};

use crate::error::ApiError;
use crate::rate_limit::caller_key;
use crate::routes::{AppState, require_admin, throttle};

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub session_id: String,
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: String,
    pub quantity: u32,
    /// Unit price in cents.
    pub price: i64,
    #[serde(default)]
    pub size: Option<String>,
}

#[derive(Deserialize)]
pub struct StatusChangeRequest {
    pub status: String,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlacedResponse {
    pub order_id: String,
    pub status: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: String,
    pub quantity: u32,
    pub price: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub order_id: String,
    pub session_id: String,
    pub status: String,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
}

fn order_response(order: Order) -> OrderResponse {
    OrderResponse {
        order_id: order.order_id.to_string(),
        session_id: order.session_id.to_string(),
        status: order.status.to_string(),
        items: order
            .items
            .into_iter()
            .map(|line| OrderItemResponse {
                product_id: line.product_id.to_string(),
                quantity: line.quantity,
                price: line.unit_price.cents(),
                size: line.size,
            })
            .collect(),
        created_at: order.created_at,
    }
}

// -- Handlers --

/// POST /orders — checkout submission; creates the order in payment_pending.
#[tracing::instrument(skip(state, req, headers))]
pub async fn create<C, O, N>(
    State(state): State<Arc<AppState<C, O, N>>>,
    headers: HeaderMap,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderPlacedResponse>), ApiError>
where
    C: CatalogStore + 'static,
    O: OrderStore + 'static,
    N: StockNotifier + 'static,
{
    throttle(
        &state.rate_limiter,
        "orders",
        &caller_key(&headers, Some(&req.session_id)),
    )
    .await?;

    let lines: Vec<OrderLine> = req
        .items
        .into_iter()
        .map(|item| OrderLine {
            product_id: item.product_id.into(),
            quantity: item.quantity,
            unit_price: Money::from_cents(item.price),
            size: item.size,
        })
        .collect();

    let order = state
        .checkout
        .place_order(&HolderId::new(req.session_id), lines)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderPlacedResponse {
            order_id: order.order_id.to_string(),
            status: order.status.to_string(),
        }),
    ))
}

/// GET /orders/:order_id — load an order by ID.
#[tracing::instrument(skip(state))]
pub async fn get<C, O, N>(
    State(state): State<Arc<AppState<C, O, N>>>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError>
where
    C: CatalogStore + 'static,
    O: OrderStore + 'static,
    N: StockNotifier + 'static,
{
    let order = state
        .orders
        .get(&OrderId::new(order_id.clone()))
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("Order {order_id} not found")))?;

    Ok(Json(order_response(order)))
}

/// POST /orders/:order_id/status — admin-driven status transition.
///
/// The transition into `payment_confirmed` triggers the permanent stock
/// decrement exactly once; repeats are rejected with 409.
#[tracing::instrument(skip(state, req, headers))]
pub async fn set_status<C, O, N>(
    State(state): State<Arc<AppState<C, O, N>>>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<StatusChangeRequest>,
) -> Result<Json<OrderResponse>, ApiError>
where
    C: CatalogStore + 'static,
    O: OrderStore + 'static,
    N: StockNotifier + 'static,
{
    require_admin(state.config.admin_token.as_deref(), &headers)?;

    let next = OrderStatus::parse(&req.status)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown order status: {}", req.status)))?;

    let order = state
        .checkout
        .transition(&OrderId::new(order_id), next)
        .await?;

    Ok(Json(order_response(order)))
}
