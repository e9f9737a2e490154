//! Prometheus metrics endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Registers help text for the counters the engine emits.
///
/// Call once, after the recorder is installed.
pub fn describe_engine_metrics() {
    metrics::describe_counter!(
        "admissions_total",
        "Flash-sale admission attempts, by outcome"
    );
    metrics::describe_counter!("checkouts_total", "Checkout attempts, by outcome");
    metrics::describe_counter!(
        "coordinator_attempts",
        "Optimistic transaction attempts, including retries"
    );
    metrics::describe_counter!(
        "coordinator_conflicts_total",
        "Commits rejected because a watched key changed"
    );
    metrics::describe_counter!(
        "stock_adjustments_total",
        "Administrative stock writes, by kind"
    );
}

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn get(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (StatusCode::OK, [(CONTENT_TYPE, PROMETHEUS_TEXT)], handle.render())
}
