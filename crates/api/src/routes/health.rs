//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use kv_store::KvStore;
use serde::Serialize;

use super::AppState;

const PROBE_KEY: &str = "health:probe";

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store: &'static str,
}

/// GET /health: returns system health status, including store reachability.
pub async fn check<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    match state.store.get(PROBE_KEY).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                store: "ok",
            }),
        ),
        Err(err) => {
            tracing::warn!(error = %err, "store health probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    store: "unavailable",
                }),
            )
        }
    }
}
