//! HTTP API server for the storefront inventory system.
//!
//! Exposes availability lookups, reservation writes, forced cleanup, and the
//! checkout/order-status flow over REST, with structured logging (tracing)
//! and Prometheus metrics.

pub mod config;
pub mod error;
pub mod rate_limit;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use cache::{Cache, InMemoryCache};
use inventory::{
    AvailabilityService, CheckoutService, CleanupService, InMemoryStockNotifier,
    ReservationService, StockDecrementService, StockNotifier,
};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{CatalogStore, InMemoryCatalogStore, InMemoryOrderStore, OrderStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use rate_limit::RateLimiter;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<C, O, N>(state: Arc<AppState<C, O, N>>, metrics_handle: PrometheusHandle) -> Router
where
    C: CatalogStore + 'static,
    O: OrderStore + 'static,
    N: StockNotifier + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/availability/{product_id}", get(routes::availability::check::<C, O, N>))
        .route("/stock/{product_id}", get(routes::availability::stock::<C, O, N>))
        .route("/stock-events/{product_id}", get(routes::events::stream::<C, O, N>))
        .route("/reserve/{product_id}", post(routes::reserve::cart::<C, O, N>))
        .route(
            "/checkout-reserve/{product_id}",
            post(routes::reserve::checkout::<C, O, N>),
        )
        .route("/force-cleanup/{product_id}", post(routes::cleanup::force::<C, O, N>))
        .route("/orders", post(routes::orders::create::<C, O, N>))
        .route("/orders/{order_id}", get(routes::orders::get::<C, O, N>))
        .route("/orders/{order_id}/status", post(routes::orders::set_status::<C, O, N>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the inventory services over the given stores and cache backend.
pub fn create_state<C, O, N>(
    catalog: C,
    orders: O,
    notifier: N,
    cache: Cache,
    config: Config,
) -> Arc<AppState<C, O, N>>
where
    C: CatalogStore + Clone + 'static,
    O: OrderStore + Clone + 'static,
    N: StockNotifier + Clone + 'static,
{
    let cart_horizon = chrono::Duration::seconds(config.cart_horizon_secs);
    let checkout_horizon = chrono::Duration::seconds(config.checkout_horizon_secs);

    let availability = AvailabilityService::new(
        catalog.clone(),
        orders.clone(),
        cache.clone(),
        Duration::from_secs(config.availability_ttl_secs),
    );
    let reservations = ReservationService::new(
        catalog.clone(),
        orders.clone(),
        cache.clone(),
        cart_horizon,
        checkout_horizon,
    );
    let cleanup = CleanupService::new(catalog.clone(), cache.clone());

    let checkout = CheckoutService::new(
        orders.clone(),
        ReservationService::new(
            catalog.clone(),
            orders.clone(),
            cache.clone(),
            cart_horizon,
            checkout_horizon,
        ),
        StockDecrementService::new(catalog.clone(), notifier.clone(), cache.clone()),
        CleanupService::new(catalog.clone(), cache.clone()),
    );

    let rate_limiter = RateLimiter::new(
        cache,
        config.rate_limit_max_attempts,
        Duration::from_secs(config.rate_limit_window_secs),
    );

    Arc::new(AppState {
        availability,
        reservations,
        cleanup,
        checkout,
        rate_limiter,
        config,
        catalog,
        orders,
        notifier,
    })
}

/// Creates the default application state with in-memory stores and cache.
///
/// Returns the cache backend alongside the state so the caller can run the
/// periodic expired-entry sweep against it.
pub fn create_default_state(
    config: Config,
) -> (
    Arc<AppState<InMemoryCatalogStore, InMemoryOrderStore, InMemoryStockNotifier>>,
    InMemoryCache,
) {
    let backend = InMemoryCache::new();
    let cache = Cache::new(Arc::new(backend.clone()));
    let state = create_state(
        InMemoryCatalogStore::new(),
        InMemoryOrderStore::new(),
        InMemoryStockNotifier::new(),
        cache,
        config,
    );
    (state, backend)
}
