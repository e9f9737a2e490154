//! Catalog endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ItemId;
use engine::Money;
use kv_store::KvStore;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct RegisterProductRequest {
    pub name: String,
    /// Decimal price, e.g. `"12.50"`.
    pub price: String,
}

#[derive(Serialize)]
pub struct ProductResponse {
    pub item_id: String,
    pub name: String,
    pub price: String,
}

/// PUT /products/:item: list an item with its unit price.
#[tracing::instrument(skip(state, req))]
pub async fn register<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(item): Path<String>,
    Json(req): Json<RegisterProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let item = ItemId::parse(item)?;
    let price = Money::parse_decimal(&req.price)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid price: {}", req.price)))?;

    state
        .storefront
        .catalog
        .register(&item, &req.name, price)
        .await?;

    Ok(Json(ProductResponse {
        item_id: item.to_string(),
        name: req.name,
        price: price.to_decimal_string(),
    }))
}
