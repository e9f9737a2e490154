//! HTTP API server with observability for the storefront transaction engine.
//!
//! Provides REST endpoints for flash sales, carts, checkout and stock
//! administration, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use engine::Storefront;
use kv_store::KvStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: KvStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/flash-sales",
            post(routes::flash_sales::create::<S>).get(routes::flash_sales::list::<S>),
        )
        .route("/flash-sales/{id}", get(routes::flash_sales::get::<S>))
        .route(
            "/flash-sales/{id}/quota",
            put(routes::flash_sales::resize_quota::<S>),
        )
        .route(
            "/flash-sales/{id}/admissions",
            post(routes::flash_sales::admit::<S>).get(routes::flash_sales::admissions::<S>),
        )
        .route("/carts/{buyer}", get(routes::carts::get::<S>))
        .route(
            "/carts/{buyer}/items/{item}",
            put(routes::carts::put_item::<S>).delete(routes::carts::remove_item::<S>),
        )
        .route("/carts/{buyer}/checkout", post(routes::carts::checkout::<S>))
        .route(
            "/stock/{item}",
            get(routes::stock::get::<S>).put(routes::stock::set::<S>),
        )
        .route("/stock/{item}/restock", post(routes::stock::restock::<S>))
        .route("/products/{item}", put(routes::products::register::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/users/{user}/orders", get(routes::orders::for_user::<S>))
        .route(
            "/users/{user}/admissions",
            get(routes::orders::admissions_for_user::<S>),
        )
        .route("/queue/orders", get(routes::orders::pending::<S>))
        .route("/notices/{channel}", get(routes::orders::notices::<S>))
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

/// Creates the application state with every engine component on `store`.
pub fn create_default_state<S: KvStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> Arc<AppState<S>> {
    let storefront = Storefront::new(store.clone()).with_admission_policy(config.admission_policy());
    Arc::new(AppState { storefront, store })
}
