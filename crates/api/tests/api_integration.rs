//! Integration tests for the API server.

use std::sync::Arc;
use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use kv_store::InMemoryStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceExt;

use api::config::Config;
use api::routes::AppState;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");
            api::routes::metrics::describe_engine_metrics();
            handle
        })
        .clone()
}

fn setup() -> axum::Router {
    setup_with_state().0
}

fn setup_with_state() -> (axum::Router, Arc<AppState<InMemoryStore>>) {
    let state = api::create_default_state(InMemoryStore::new(), &Config::default());
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

/// Creates an event that is open right now.
async fn create_open_sale(app: &axum::Router, event_id: &str, quota: u32) {
    let now = Utc::now();
    let (status, _) = send(
        app,
        "POST",
        "/flash-sales",
        Some(serde_json::json!({
            "event_id": event_id,
            "item_id": "7",
            "quota": quota,
            "window": {
                "kind": "between",
                "start": now - Duration::hours(1),
                "end": now + Duration::hours(1),
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

async fn stock_catalog(app: &axum::Router) {
    for (item, name, price, level) in [("A", "Apple", "120", 10), ("B", "Bread", "30", 1)] {
        let (status, _) = send(
            app,
            "PUT",
            &format!("/products/{item}"),
            Some(serde_json::json!({ "name": name, "price": price })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(
            app,
            "PUT",
            &format!("/stock/{item}"),
            Some(serde_json::json!({ "level": level })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let (status, json) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["store"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_create_and_get_flash_sale() {
    let app = setup();
    create_open_sale(&app, "2991", 2).await;

    let (status, json) = send(&app, "GET", "/flash-sales/2991", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["remaining"], 2);
    assert_eq!(json["total_quota"], 2);
    assert_eq!(json["open_now"], true);
    assert_eq!(json["window"]["kind"], "between");

    let (status, json) = send(&app, "GET", "/flash-sales", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_admission_flow() {
    let app = setup();
    create_open_sale(&app, "2991", 1).await;
    let admit = |participant: &str| serde_json::json!({ "participant": participant });

    let (status, json) = send(&app, "POST", "/flash-sales/2991/admissions", Some(admit("alice"))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["outcome"], "admitted");
    let order_id = json["order_id"].as_str().unwrap().to_string();
    assert!(order_id.starts_with("SK"));

    let (status, json) = send(&app, "POST", "/flash-sales/2991/admissions", Some(admit("alice"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "already_admitted");

    let (status, json) = send(&app, "POST", "/flash-sales/2991/admissions", Some(admit("bob"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "quota_exhausted");

    let (status, json) = send(&app, "GET", &format!("/orders/{order_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["kind"], "admission");
    assert_eq!(json["participant"], "alice");

    let (_, json) = send(&app, "GET", "/users/alice/admissions", None).await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    let (_, json) = send(&app, "GET", "/flash-sales/2991/admissions", None).await;
    assert_eq!(json["order_ids"][0], order_id.as_str());

    let (_, json) = send(&app, "GET", "/notices/seckill", None).await;
    assert_eq!(json[0]["type"], "admission_succeeded");
}

#[tokio::test]
async fn test_admission_to_unknown_event() {
    let app = setup();

    let (status, json) = send(
        &app,
        "POST",
        "/flash-sales/nope/admissions",
        Some(serde_json::json!({ "participant": "alice" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_invalid_participant_id() {
    let app = setup();
    create_open_sale(&app, "2991", 1).await;

    let (status, _) = send(
        &app,
        "POST",
        "/flash-sales/2991/admissions",
        Some(serde_json::json!({ "participant": "a:b" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_flash_sale_rejects_zero_quota() {
    let app = setup();
    let now = Utc::now();

    let (status, _) = send(
        &app,
        "POST",
        "/flash-sales",
        Some(serde_json::json!({
            "event_id": "e1",
            "item_id": "7",
            "quota": 0,
            "window": { "kind": "between", "start": now, "end": now + Duration::hours(1) }
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resize_quota() {
    let app = setup();
    create_open_sale(&app, "2991", 1).await;
    send(
        &app,
        "POST",
        "/flash-sales/2991/admissions",
        Some(serde_json::json!({ "participant": "alice" })),
    )
    .await;

    let (status, json) = send(
        &app,
        "PUT",
        "/flash-sales/2991/quota",
        Some(serde_json::json!({ "quota": 3 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "resized");
    assert_eq!(json["remaining"], 2);
    assert_eq!(json["admitted"], 1);
}

#[tokio::test]
async fn test_resize_below_admitted_is_bad_request() {
    let app = setup();
    create_open_sale(&app, "2992", 2).await;
    for participant in ["alice", "bob"] {
        send(
            &app,
            "POST",
            "/flash-sales/2992/admissions",
            Some(serde_json::json!({ "participant": participant })),
        )
        .await;
    }

    let (status, _) = send(
        &app,
        "PUT",
        "/flash-sales/2992/quota",
        Some(serde_json::json!({ "quota": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(&app, "GET", "/flash-sales/2992", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["quota"], 2);
    assert_eq!(json["remaining"], 0);
}

#[tokio::test]
async fn test_checkout_flow() {
    let (app, state) = setup_with_state();
    stock_catalog(&app).await;

    let (status, json) = send(
        &app,
        "PUT",
        "/carts/alice/items/A",
        Some(serde_json::json!({ "quantity": "2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["lines"]["A"], 2);

    let (status, json) = send(&app, "POST", "/carts/alice/checkout", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["outcome"], "completed");
    let order_id = json["order_id"].as_str().unwrap().to_string();

    let (_, json) = send(&app, "GET", "/stock/A", None).await;
    assert_eq!(json["level"], 8);

    let (status, json) = send(&app, "GET", &format!("/orders/{order_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["kind"], "checkout");
    assert_eq!(json["total"], "240.00");
    assert_eq!(json["status"], "created");

    let (_, json) = send(&app, "GET", "/carts/alice", None).await;
    assert!(json["lines"].as_object().unwrap().is_empty());

    let (_, json) = send(&app, "GET", "/queue/orders", None).await;
    assert_eq!(json[0], order_id.as_str());

    let pending = state.storefront.queue.pending().await.unwrap();
    assert_eq!(pending, vec![order_id]);
}

#[tokio::test]
async fn test_checkout_reports_every_shortage() {
    let app = setup();
    stock_catalog(&app).await;
    for (item, qty) in [("A", 11), ("B", 2)] {
        send(
            &app,
            "PUT",
            &format!("/carts/bob/items/{item}"),
            Some(serde_json::json!({ "quantity": qty })),
        )
        .await;
    }

    let (status, json) = send(&app, "POST", "/carts/bob/checkout", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "insufficient_stock");
    assert_eq!(json["shortages"].as_array().unwrap().len(), 2);

    let (_, json) = send(&app, "GET", "/stock/A", None).await;
    assert_eq!(json["level"], 10);
}

#[tokio::test]
async fn test_checkout_empty_cart() {
    let app = setup();

    let (status, json) = send(&app, "POST", "/carts/nobody/checkout", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "empty_cart");
}

#[tokio::test]
async fn test_non_numeric_quantity_is_rejected() {
    let app = setup();

    let (status, json) = send(
        &app,
        "PUT",
        "/carts/alice/items/A",
        Some(serde_json::json!({ "quantity": "two" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (status, _) = send(
        &app,
        "PUT",
        "/carts/alice/items/A",
        Some(serde_json::json!({ "quantity": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_remove_cart_item() {
    let app = setup();
    send(
        &app,
        "PUT",
        "/carts/alice/items/A",
        Some(serde_json::json!({ "quantity": 1 })),
    )
    .await;

    let (status, _) = send(&app, "DELETE", "/carts/alice/items/A", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "DELETE", "/carts/alice/items/A", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_restock() {
    let app = setup();
    stock_catalog(&app).await;

    let (status, json) = send(
        &app,
        "POST",
        "/stock/B/restock",
        Some(serde_json::json!({ "quantity": 4 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["level"], 5);

    let (status, _) = send(
        &app,
        "POST",
        "/stock/B/restock",
        Some(serde_json::json!({ "quantity": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_price_is_rejected() {
    let app = setup();

    let (status, _) = send(
        &app,
        "PUT",
        "/products/A",
        Some(serde_json::json!({ "name": "Apple", "price": "1.234" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_nonexistent_order() {
    let app = setup();

    let (status, _) = send(&app, "GET", "/orders/20250101000000000000", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
