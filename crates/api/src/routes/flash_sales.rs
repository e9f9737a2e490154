//! Flash-sale administration and admission endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{ItemId, SaleEventId, UserId};
use engine::{AdmissionOutcome, FlashSaleConfig, FlashSaleStatus, QuotaResize, SaleWindow};
use kv_store::KvStore;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateFlashSaleRequest {
    pub event_id: String,
    pub item_id: String,
    pub quota: u32,
    pub window: SaleWindow,
}

#[derive(Deserialize)]
pub struct ResizeQuotaRequest {
    pub quota: u32,
}

#[derive(Deserialize)]
pub struct AdmissionRequest {
    pub participant: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct FlashSaleResponse {
    pub event_id: String,
    pub item_id: String,
    pub quota: u32,
    pub window: SaleWindow,
    pub remaining: i64,
    pub admitted: Vec<String>,
    pub total_quota: i64,
    pub open_now: bool,
    pub checked_at: DateTime<Utc>,
}

impl From<FlashSaleStatus> for FlashSaleResponse {
    fn from(status: FlashSaleStatus) -> Self {
        Self {
            event_id: status.config.event_id.to_string(),
            item_id: status.config.item_id.to_string(),
            quota: status.config.quota,
            window: status.config.window,
            remaining: status.remaining,
            admitted: status.admitted.iter().map(ToString::to_string).collect(),
            total_quota: status.total_quota,
            open_now: status.open_now,
            checked_at: status.checked_at,
        }
    }
}

#[derive(Serialize)]
pub struct EventAdmissionsResponse {
    pub event_id: String,
    pub order_ids: Vec<String>,
}

// -- Handlers --

/// POST /flash-sales: create an event, or reset an existing one.
#[tracing::instrument(skip(state, req), fields(event_id = %req.event_id))]
pub async fn create<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateFlashSaleRequest>,
) -> Result<(StatusCode, Json<FlashSaleResponse>), ApiError> {
    let config = FlashSaleConfig {
        event_id: SaleEventId::parse(req.event_id)?,
        item_id: ItemId::parse(req.item_id)?,
        window: req.window,
        quota: req.quota,
    };
    let flash_sales = &state.storefront.flash_sales;
    flash_sales.create_event(&config).await?;
    let status = flash_sales.event_status(&config.event_id).await?;

    Ok((StatusCode::CREATED, Json(status.into())))
}

/// GET /flash-sales: status of every configured event.
#[tracing::instrument(skip(state))]
pub async fn list<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<FlashSaleResponse>>, ApiError> {
    let statuses = state.storefront.flash_sales.all_statuses().await?;
    Ok(Json(statuses.into_iter().map(Into::into).collect()))
}

/// GET /flash-sales/:id: status of one event.
#[tracing::instrument(skip(state))]
pub async fn get<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<FlashSaleResponse>, ApiError> {
    let event_id = SaleEventId::parse(id)?;
    let status = state.storefront.flash_sales.event_status(&event_id).await?;
    Ok(Json(status.into()))
}

/// PUT /flash-sales/:id/quota: change the quota, keeping admissions.
#[tracing::instrument(skip(state, req))]
pub async fn resize_quota<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<ResizeQuotaRequest>,
) -> Result<(StatusCode, Json<QuotaResize>), ApiError> {
    let event_id = SaleEventId::parse(id)?;
    let outcome = state
        .storefront
        .flash_sales
        .resize_quota(&event_id, req.quota)
        .await?;

    let status = match outcome {
        QuotaResize::Resized { .. } => StatusCode::OK,
        QuotaResize::Conflict => StatusCode::CONFLICT,
    };
    Ok((status, Json(outcome)))
}

/// POST /flash-sales/:id/admissions: try to admit a participant.
#[tracing::instrument(skip(state, req), fields(participant = %req.participant))]
pub async fn admit<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<AdmissionRequest>,
) -> Result<(StatusCode, Json<AdmissionOutcome>), ApiError> {
    let event_id = SaleEventId::parse(id)?;
    let participant = UserId::parse(req.participant)?;
    let outcome = state
        .storefront
        .admission
        .admit(&event_id, &participant)
        .await?;

    let status = match outcome {
        AdmissionOutcome::Admitted { .. } => StatusCode::CREATED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// GET /flash-sales/:id/admissions: admission order ids, in admission order.
#[tracing::instrument(skip(state))]
pub async fn admissions<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<EventAdmissionsResponse>, ApiError> {
    let event_id = SaleEventId::parse(id)?;
    let order_ids = state.storefront.orders.event_admissions(&event_id).await?;
    Ok(Json(EventAdmissionsResponse {
        event_id: event_id.to_string(),
        order_ids: order_ids.iter().map(ToString::to_string).collect(),
    }))
}
