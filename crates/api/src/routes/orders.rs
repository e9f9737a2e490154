//! Order lookup endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use engine::services::Notice;
use engine::{AdmissionOrder, Order, keys};
use kv_store::KvStore;
use serde::Serialize;

use super::AppState;
use crate::error::ApiError;

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub buyer: String,
    pub items: BTreeMap<String, u32>,
    /// Decimal total, frozen at checkout.
    pub total: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            buyer: order.buyer.to_string(),
            items: order
                .items
                .iter()
                .map(|(item, qty)| (item.to_string(), *qty))
                .collect(),
            total: order.total.to_decimal_string(),
            status: order.status.to_string(),
            created_at: order.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct AdmissionOrderResponse {
    pub id: String,
    pub participant: String,
    pub event_id: String,
    pub item_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<AdmissionOrder> for AdmissionOrderResponse {
    fn from(order: AdmissionOrder) -> Self {
        Self {
            id: order.id.to_string(),
            participant: order.participant.to_string(),
            event_id: order.event_id.to_string(),
            item_id: order.item_id.to_string(),
            created_at: order.created_at,
        }
    }
}

/// Either kind of order, tagged by `kind`.
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnyOrderResponse {
    Checkout(OrderResponse),
    Admission(AdmissionOrderResponse),
}

// -- Handlers --

/// GET /orders/:id: a checkout order or a flash-sale admission order.
#[tracing::instrument(skip(state))]
pub async fn get<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<AnyOrderResponse>, ApiError> {
    let order_id = OrderId::parse(id)?;
    let orders = &state.storefront.orders;

    if let Some(order) = orders.order(&order_id).await? {
        return Ok(Json(AnyOrderResponse::Checkout(order.into())));
    }
    if let Some(order) = orders.admission_order(&order_id).await? {
        return Ok(Json(AnyOrderResponse::Admission(order.into())));
    }
    Err(ApiError::NotFound(format!("Order {order_id} not found")))
}

/// GET /users/:user/orders: checkout orders of a buyer, newest first.
#[tracing::instrument(skip(state))]
pub async fn for_user<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(user): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let buyer = UserId::parse(user)?;
    let orders = state.storefront.orders.orders_for(&buyer).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// GET /users/:user/admissions: admission orders of a participant, newest first.
#[tracing::instrument(skip(state))]
pub async fn admissions_for_user<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(user): Path<String>,
) -> Result<Json<Vec<AdmissionOrderResponse>>, ApiError> {
    let participant = UserId::parse(user)?;
    let orders = state
        .storefront
        .orders
        .admission_orders_for(&participant)
        .await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// GET /queue/orders: order ids waiting for downstream processing.
#[tracing::instrument(skip(state))]
pub async fn pending<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.storefront.queue.pending().await?))
}

/// GET /notices/:channel: delivered notices of `orders` or `seckill`, oldest first.
#[tracing::instrument(skip(state))]
pub async fn notices<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(channel): Path<String>,
) -> Result<Json<Vec<Notice>>, ApiError> {
    let key = match channel.as_str() {
        "orders" => keys::ORDER_STREAM,
        "seckill" => keys::SECKILL_STREAM,
        other => return Err(ApiError::NotFound(format!("Unknown channel {other}"))),
    };
    Ok(Json(state.storefront.notices.read_channel(key).await?))
}
