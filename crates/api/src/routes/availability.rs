//! Availability and stock lookup endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use common::{HolderId, ProductId};
use inventory::StockNotifier;
use serde::{Deserialize, Serialize};
use store::{CatalogStore, OrderStore};

use crate::error::ApiError;
use crate::rate_limit::caller_key;
use crate::routes::{AppState, throttle};

#[derive(Deserialize)]
pub struct SessionQuery {
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

impl SessionQuery {
    fn require(self) -> Result<String, ApiError> {
        self.session_id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ApiError::BadRequest("sessionId is required".to_string()))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub available: bool,
    pub message: String,
    pub stock: u32,
    pub available_stock: u32,
    pub reserved_by_current_user: u32,
    pub reserved_by_others: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StockResponse {
    pub stock: u32,
    pub available_stock: u32,
    pub reserved_quantity: u32,
    pub stock_message: String,
}

/// GET /availability/:product_id — the caller's availability snapshot.
#[tracing::instrument(skip(state, query, headers))]
pub async fn check<C, O, N>(
    State(state): State<Arc<AppState<C, O, N>>>,
    Path(product_id): Path<String>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Result<Json<AvailabilityResponse>, ApiError>
where
    C: CatalogStore + 'static,
    O: OrderStore + 'static,
    N: StockNotifier + 'static,
{
    let session = query.require()?;
    throttle(
        &state.rate_limiter,
        "availability",
        &caller_key(&headers, Some(&session)),
    )
    .await?;

    let snapshot = state
        .availability
        .check(&ProductId::new(product_id), &HolderId::new(session))
        .await?;

    Ok(Json(AvailabilityResponse {
        available: snapshot.available,
        message: snapshot.message,
        stock: snapshot.stock,
        available_stock: snapshot.available_stock,
        reserved_by_current_user: snapshot.reserved_by_caller,
        reserved_by_others: snapshot.reserved_by_others,
    }))
}

/// GET /stock/:product_id — the stock view of the same snapshot.
#[tracing::instrument(skip(state, query, headers))]
pub async fn stock<C, O, N>(
    State(state): State<Arc<AppState<C, O, N>>>,
    Path(product_id): Path<String>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Result<Json<StockResponse>, ApiError>
where
    C: CatalogStore + 'static,
    O: OrderStore + 'static,
    N: StockNotifier + 'static,
{
    let session = query.require()?;
    throttle(
        &state.rate_limiter,
        "availability",
        &caller_key(&headers, Some(&session)),
    )
    .await?;

    let snapshot = state
        .availability
        .check(&ProductId::new(product_id), &HolderId::new(session))
        .await?;

    Ok(Json(StockResponse {
        stock: snapshot.stock,
        available_stock: snapshot.available_stock,
        reserved_quantity: snapshot.reserved_by_caller,
        stock_message: snapshot.message,
    }))
}
