//! Cart and checkout endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{ItemId, UserId};
use engine::{CartSnapshot, CheckoutOutcome, parse_quantity};
use kv_store::KvStore;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;

// -- Request types --

/// A quantity as sent by clients: a JSON number or a numeric string.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum RawQuantity {
    Number(i64),
    Text(String),
}

impl RawQuantity {
    fn as_text(&self) -> String {
        match self {
            RawQuantity::Number(n) => n.to_string(),
            RawQuantity::Text(s) => s.clone(),
        }
    }
}

#[derive(Deserialize)]
pub struct PutItemRequest {
    pub quantity: RawQuantity,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub buyer: String,
    pub lines: BTreeMap<String, u32>,
}

impl From<CartSnapshot> for CartResponse {
    fn from(cart: CartSnapshot) -> Self {
        Self {
            buyer: cart.buyer.to_string(),
            lines: cart
                .lines()
                .map(|(item, qty)| (item.to_string(), qty))
                .collect(),
        }
    }
}

// -- Handlers --

/// GET /carts/:buyer: current cart contents.
#[tracing::instrument(skip(state))]
pub async fn get<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(buyer): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let buyer = UserId::parse(buyer)?;
    let cart = state.storefront.carts.snapshot(&buyer).await?;
    Ok(Json(cart.into()))
}

/// PUT /carts/:buyer/items/:item: set the quantity of one line.
#[tracing::instrument(skip(state, req))]
pub async fn put_item<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((buyer, item)): Path<(String, String)>,
    Json(req): Json<PutItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let buyer = UserId::parse(buyer)?;
    let item = ItemId::parse(item)?;
    let quantity = parse_quantity(item.as_str(), &req.quantity.as_text())?;

    let carts = &state.storefront.carts;
    carts.put_item(&buyer, &item, quantity).await?;
    Ok(Json(carts.snapshot(&buyer).await?.into()))
}

/// DELETE /carts/:buyer/items/:item: drop one line.
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((buyer, item)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let buyer = UserId::parse(buyer)?;
    let item = ItemId::parse(item)?;
    if state.storefront.carts.remove_item(&buyer, &item).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("{item} is not in the cart of {buyer}")))
    }
}

/// POST /carts/:buyer/checkout: turn the cart into an order.
#[tracing::instrument(skip(state))]
pub async fn checkout<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(buyer): Path<String>,
) -> Result<(StatusCode, Json<CheckoutOutcome>), ApiError> {
    let buyer = UserId::parse(buyer)?;
    let outcome = state.storefront.checkout.checkout(&buyer).await?;

    let status = match outcome {
        CheckoutOutcome::Completed { .. } => StatusCode::CREATED,
        CheckoutOutcome::Conflict => StatusCode::CONFLICT,
        CheckoutOutcome::EmptyCart | CheckoutOutcome::InsufficientStock { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}
