//! Forced reservation cleanup endpoint (admin).

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use common::{HolderId, ProductId};
use inventory::{CleanupPolicy, StockNotifier};
use serde::{Deserialize, Serialize};
use store::{CatalogStore, OrderStore};

use crate::error::ApiError;
use crate::rate_limit::caller_key;
use crate::routes::{AppState, require_admin, throttle};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceCleanupRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub clear_all: Option<bool>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForceCleanupResponse {
    pub original_count: usize,
    pub cleared_count: usize,
    pub remaining_count: usize,
}

/// POST /force-cleanup/:product_id — manual unstick for stuck reservations.
///
/// `clearAll: true` wipes the ledger; a `sessionId` releases one holder;
/// neither runs the routine expired-entry sweep.
#[tracing::instrument(skip(state, req, headers))]
pub async fn force<C, O, N>(
    State(state): State<Arc<AppState<C, O, N>>>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ForceCleanupRequest>,
) -> Result<Json<ForceCleanupResponse>, ApiError>
where
    C: CatalogStore + 'static,
    O: OrderStore + 'static,
    N: StockNotifier + 'static,
{
    require_admin(state.config.admin_token.as_deref(), &headers)?;
    throttle(
        &state.rate_limiter,
        "cleanup",
        &caller_key(&headers, req.session_id.as_deref()),
    )
    .await?;

    let policy = if req.clear_all.unwrap_or(false) {
        CleanupPolicy::All
    } else if let Some(session) = req.session_id.filter(|s| !s.is_empty()) {
        CleanupPolicy::Holder(HolderId::new(session))
    } else {
        CleanupPolicy::Expired
    };

    let outcome = state
        .cleanup
        .run(&ProductId::new(product_id), &policy)
        .await?;

    Ok(Json(ForceCleanupResponse {
        original_count: outcome.original_count,
        cleared_count: outcome.cleared_count,
        remaining_count: outcome.remaining_count,
    }))
}
