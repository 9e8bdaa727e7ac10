//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use common::HolderId;
use inventory::InMemoryStockNotifier;
use metrics_exporter_prometheus::PrometheusHandle;
use store::{
    CatalogStore, InMemoryCatalogStore, InMemoryOrderStore, Product, Reservation,
};
use tower::ServiceExt;

use api::config::Config;
use api::routes::AppState;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

type InMemoryState = Arc<AppState<InMemoryCatalogStore, InMemoryOrderStore, InMemoryStockNotifier>>;

fn test_config() -> Config {
    Config {
        admin_token: Some("test-admin".to_string()),
        rate_limit_max_attempts: 1000,
        ..Config::default()
    }
}

fn setup_with_config(config: Config) -> (axum::Router, InMemoryState) {
    let (state, _) = api::create_default_state(config);
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

fn setup() -> (axum::Router, InMemoryState) {
    setup_with_config(test_config())
}

async fn seed_product(state: &InMemoryState, id: &str, stock: u32) {
    state
        .catalog
        .put(Product::new(id, "Wool coat", stock))
        .await
        .unwrap();
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn post_json_admin(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", "Bearer test-admin")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn availability_requires_session() {
    let (app, state) = setup();
    seed_product(&state, "p1", 5).await;

    let response = app.oneshot(get("/availability/p1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn availability_unknown_product_is_404() {
    let (app, _) = setup();

    let response = app
        .oneshot(get("/availability/ghost?sessionId=sess-a"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn availability_reports_plain_stock() {
    let (app, state) = setup();
    seed_product(&state, "p1", 5).await;

    let response = app
        .oneshot(get("/availability/p1?sessionId=sess-a"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["available"], true);
    assert_eq!(json["stock"], 5);
    assert_eq!(json["availableStock"], 5);
    assert_eq!(json["reservedByCurrentUser"], 0);
    assert_eq!(json["reservedByOthers"], 0);
    assert_eq!(json["message"], "5 in stock");
}

#[tokio::test]
async fn contention_over_five_units() {
    let (app, state) = setup();
    seed_product(&state, "p1", 5).await;

    // A reserves 3.
    let response = app
        .clone()
        .oneshot(post_json(
            "/reserve/p1",
            serde_json::json!({"sessionId": "sess-a", "quantity": 3}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["availableStock"], 2);
    assert!(json["reservationId"].as_str().unwrap().starts_with("sess-a-p1-"));

    // B asks for 3: rejected with the remainder named, still HTTP 200.
    let response = app
        .clone()
        .oneshot(post_json(
            "/reserve/p1",
            serde_json::json!({"sessionId": "sess-b", "quantity": 3}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("Only 2 available"));

    // B takes the remaining 2.
    let response = app
        .clone()
        .oneshot(post_json(
            "/reserve/p1",
            serde_json::json!({"sessionId": "sess-b", "quantity": 2}),
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["availableStock"], 0);

    // A sees their own claim, not a sold-out wall.
    let response = app
        .oneshot(get("/availability/p1?sessionId=sess-a"))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["available"], true);
    assert_eq!(json["reservedByCurrentUser"], 3);
    assert_eq!(json["availableStock"], 0);
}

#[tokio::test]
async fn reserve_then_availability_roundtrip() {
    let (app, state) = setup();
    seed_product(&state, "p1", 5).await;

    app.clone()
        .oneshot(post_json(
            "/reserve/p1",
            serde_json::json!({"sessionId": "sess-a", "quantity": 2}),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(get("/availability/p1?sessionId=sess-a"))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["reservedByCurrentUser"], 2);
}

#[tokio::test]
async fn last_unit_blocks_other_shoppers_until_expiry() {
    let (app, state) = setup();

    // Holder A holds the only unit.
    let mut product = Product::new("p1", "Wool coat", 1);
    product.reservations = vec![Reservation::new(
        HolderId::new("sess-a"),
        1,
        Utc::now() + Duration::minutes(10),
    )];
    state.catalog.put(product).await.unwrap();

    let response = app
        .clone()
        .oneshot(get("/availability/p1?sessionId=sess-b"))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["available"], false);
    assert!(json["message"].as_str().unwrap().contains("reserved by another"));

    // The entry lapses; B's next check sees stock again with no cleanup call.
    let mut product = Product::new("p1", "Wool coat", 1);
    product.reservations = vec![Reservation::new(
        HolderId::new("sess-a"),
        1,
        Utc::now() - Duration::seconds(1),
    )];
    state.catalog.put(product).await.unwrap();

    // Different session key: the earlier check was cached for sess-b.
    let response = app
        .oneshot(get("/availability/p1?sessionId=sess-c"))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["available"], true);
    assert_eq!(json["availableStock"], 1);
}

#[tokio::test]
async fn stock_endpoint_shape() {
    let (app, state) = setup();
    seed_product(&state, "p1", 4).await;

    app.clone()
        .oneshot(post_json(
            "/reserve/p1",
            serde_json::json!({"sessionId": "sess-a", "quantity": 1}),
        ))
        .await
        .unwrap();

    let response = app.oneshot(get("/stock/p1?sessionId=sess-a")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["stock"], 4);
    assert_eq!(json["availableStock"], 3);
    assert_eq!(json["reservedQuantity"], 1);
    assert_eq!(json["stockMessage"], "1 reserved by you");
}

#[tokio::test]
async fn checkout_reserve_holds_longer() {
    let (app, state) = setup();
    seed_product(&state, "p1", 5).await;

    let response = app
        .oneshot(post_json(
            "/checkout-reserve/p1",
            serde_json::json!({"sessionId": "sess-a", "quantity": 2}),
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["success"], true);

    let reserved_until: chrono::DateTime<Utc> =
        json["reservedUntil"].as_str().unwrap().parse().unwrap();
    assert!(reserved_until > Utc::now() + Duration::hours(23));
}

#[tokio::test]
async fn reserve_validation_errors() {
    let (app, state) = setup();
    seed_product(&state, "p1", 5).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/reserve/p1",
            serde_json::json!({"sessionId": "sess-a", "quantity": 0}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json(
            "/reserve/p1",
            serde_json::json!({"sessionId": "", "quantity": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn force_cleanup_requires_bearer_token() {
    let (app, state) = setup();
    seed_product(&state, "p1", 5).await;

    let response = app
        .oneshot(post_json(
            "/force-cleanup/p1",
            serde_json::json!({"clearAll": true}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn force_cleanup_clear_all_unsticks_the_ledger() {
    let (app, state) = setup();

    let mut product = Product::new("p1", "Wool coat", 5);
    product.reservations = vec![
        Reservation::new(HolderId::new("sess-a"), 2, Utc::now() + Duration::minutes(10)),
        Reservation::new(HolderId::new("sess-b"), 1, Utc::now() + Duration::minutes(10)),
        Reservation::new(HolderId::new("sess-c"), 2, Utc::now() + Duration::minutes(10)),
    ];
    state.catalog.put(product).await.unwrap();

    let response = app
        .clone()
        .oneshot(post_json_admin(
            "/force-cleanup/p1",
            serde_json::json!({"clearAll": true}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["originalCount"], 3);
    assert_eq!(json["clearedCount"], 3);
    assert_eq!(json["remainingCount"], 0);

    let response = app
        .oneshot(get("/availability/p1?sessionId=sess-z"))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["availableStock"], 5);
}

#[tokio::test]
async fn force_cleanup_for_one_session() {
    let (app, state) = setup();

    let mut product = Product::new("p1", "Wool coat", 5);
    product.reservations = vec![
        Reservation::new(HolderId::new("sess-a"), 2, Utc::now() + Duration::minutes(10)),
        Reservation::new(HolderId::new("sess-b"), 1, Utc::now() + Duration::minutes(10)),
    ];
    state.catalog.put(product).await.unwrap();

    let response = app
        .oneshot(post_json_admin(
            "/force-cleanup/p1",
            serde_json::json!({"sessionId": "sess-a"}),
        ))
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["clearedCount"], 1);
    assert_eq!(json["remainingCount"], 1);
}

#[tokio::test]
async fn order_lifecycle_decrements_stock_exactly_once() {
    let (app, state) = setup();
    seed_product(&state, "p1", 5).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/orders",
            serde_json::json!({
                "sessionId": "sess-a",
                "items": [{"productId": "p1", "quantity": 2, "price": 4500, "size": "M"}]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    let order_id = json["orderId"].as_str().unwrap().to_string();
    assert!(order_id.starts_with("HIM-"));
    assert_eq!(json["status"], "payment_pending");

    // Admin confirms payment: the decrement fires.
    let response = app
        .clone()
        .oneshot(post_json_admin(
            &format!("/orders/{order_id}/status"),
            serde_json::json!({"status": "payment_confirmed"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let doc = state
        .catalog
        .fetch(&common::ProductId::new("p1"))
        .await
        .unwrap()
        .unwrap()
        .product;
    assert_eq!(doc.stock, 3);

    // A repeat confirmation is rejected by the state machine, stock untouched.
    let response = app
        .clone()
        .oneshot(post_json_admin(
            &format!("/orders/{order_id}/status"),
            serde_json::json!({"status": "payment_confirmed"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let doc = state
        .catalog
        .fetch(&common::ProductId::new("p1"))
        .await
        .unwrap()
        .unwrap()
        .product;
    assert_eq!(doc.stock, 3);

    // The order itself reads back confirmed.
    let response = app
        .oneshot(get(&format!("/orders/{order_id}")))
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["status"], "payment_confirmed");
    assert_eq!(json["items"][0]["size"], "M");
}

#[tokio::test]
async fn order_status_change_requires_admin() {
    let (app, state) = setup();
    seed_product(&state, "p1", 5).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/orders",
            serde_json::json!({
                "sessionId": "sess-a",
                "items": [{"productId": "p1", "quantity": 1, "price": 4500}]
            }),
        ))
        .await
        .unwrap();
    let json = body_json(response).await;
    let order_id = json["orderId"].as_str().unwrap().to_string();

    let response = app
        .oneshot(post_json(
            &format!("/orders/{order_id}/status"),
            serde_json::json!({"status": "payment_confirmed"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_status_is_a_bad_request() {
    let (app, state) = setup();
    seed_product(&state, "p1", 5).await;

    let response = app
        .oneshot(post_json_admin(
            "/orders/HIM-123/status",
            serde_json::json!({"status": "refunded"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rate_limit_returns_429_with_retry_after() {
    let config = Config {
        rate_limit_max_attempts: 2,
        ..test_config()
    };
    let (app, state) = setup_with_config(config);
    seed_product(&state, "p1", 5).await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(get("/availability/p1?sessionId=sess-a"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(get("/availability/p1?sessionId=sess-a"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));
}

#[tokio::test]
async fn checkout_submission_with_exhausted_stock_conflicts() {
    let (app, state) = setup();
    seed_product(&state, "p1", 1).await;

    // Another session claims the only unit.
    app.clone()
        .oneshot(post_json(
            "/reserve/p1",
            serde_json::json!({"sessionId": "sess-b", "quantity": 1}),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            "/orders",
            serde_json::json!({
                "sessionId": "sess-a",
                "items": [{"productId": "p1", "quantity": 1, "price": 4500}]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
