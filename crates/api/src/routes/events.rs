//! Server-push stock change feed.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::{DateTime, Utc};
use common::ProductId;
use inventory::StockNotifier;
use serde::Serialize;
use store::{CatalogStore, OrderStore};
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};

use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StockEvent {
    product_id: String,
    new_stock: u32,
    order_id: String,
    at: DateTime<Utc>,
}

/// GET /stock-events/:product_id — pushes stock changes as they commit.
///
/// Sessions viewing a product subscribe here instead of polling on a timer;
/// the polling endpoints remain the fallback for clients that cannot hold a
/// connection open.
#[tracing::instrument(skip(state))]
pub async fn stream<C, O, N>(
    State(state): State<Arc<AppState<C, O, N>>>,
    Path(product_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError>
where
    C: CatalogStore + 'static,
    O: OrderStore + 'static,
    N: StockNotifier + 'static,
{
    let feed = state
        .notifier
        .subscribe()
        .ok_or_else(|| ApiError::NotFound("Stock events are not available".to_string()))?;

    let product = ProductId::new(product_id);
    let stream = BroadcastStream::new(feed).filter_map(move |item| {
        // A lagged receiver just misses notices; the client re-syncs on the
        // next one.
        let notice = item.ok()?;
        if notice.product_id != product {
            return None;
        }
        let event = Event::default()
            .event("stock")
            .json_data(StockEvent {
                product_id: notice.product_id.to_string(),
                new_stock: notice.new_stock,
                order_id: notice.order_id.to_string(),
                at: notice.at,
            })
            .ok()?;
        Some(Ok(event))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
