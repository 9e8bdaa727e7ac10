//! HTTP route handlers.

pub mod availability;
pub mod cleanup;
pub mod events;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod reserve;

use axum::http::HeaderMap;
use inventory::{
    AvailabilityService, CheckoutService, CleanupService, ReservationService, StockNotifier,
};
use store::{CatalogStore, OrderStore};

use crate::config::Config;
use crate::error::ApiError;
use crate::rate_limit::{RateLimitDecision, RateLimiter};

/// Shared application state accessible from all handlers.
pub struct AppState<C, O, N>
where
    C: CatalogStore,
    O: OrderStore,
    N: StockNotifier,
{
    pub availability: AvailabilityService<C, O>,
    pub reservations: ReservationService<C, O>,
    pub cleanup: CleanupService<C>,
    pub checkout: CheckoutService<C, O, N>,
    pub rate_limiter: RateLimiter,
    pub config: Config,
    pub catalog: C,
    pub orders: O,
    pub notifier: N,
}

/// Rejects the request unless it carries the configured admin bearer token.
///
/// With no token configured every admin call is rejected; running without
/// authentication must be a deliberate choice, not a default.
pub(crate) fn require_admin(admin_token: Option<&str>, headers: &HeaderMap) -> Result<(), ApiError> {
    let expected = admin_token.ok_or(ApiError::Unauthorized)?;
    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    if presented != expected {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

/// Applies the per-caller rate limit for a handler scope.
pub(crate) async fn throttle(
    limiter: &RateLimiter,
    scope: &str,
    caller: &str,
) -> Result<(), ApiError> {
    match limiter.check(scope, caller).await {
        RateLimitDecision::Allowed => Ok(()),
        RateLimitDecision::Limited { retry_after_secs } => {
            Err(ApiError::RateLimited { retry_after_secs })
        }
    }
}
