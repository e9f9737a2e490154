//! Administrative stock endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::ItemId;
use engine::StockLevel;
use kv_store::KvStore;
use serde::Deserialize;

use super::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct SetStockRequest {
    pub level: u32,
}

#[derive(Deserialize)]
pub struct RestockRequest {
    pub quantity: u32,
}

/// GET /stock/:item: current stock level.
#[tracing::instrument(skip(state))]
pub async fn get<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(item): Path<String>,
) -> Result<Json<StockLevel>, ApiError> {
    let item = ItemId::parse(item)?;
    Ok(Json(state.storefront.stock.level(&item).await?))
}

/// PUT /stock/:item: overwrite the stock level.
#[tracing::instrument(skip(state, req), fields(level = req.level))]
pub async fn set<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(item): Path<String>,
    Json(req): Json<SetStockRequest>,
) -> Result<Json<StockLevel>, ApiError> {
    let item = ItemId::parse(item)?;
    Ok(Json(state.storefront.stock.set_stock(&item, req.level).await?))
}

/// POST /stock/:item/restock: add units to the current level.
#[tracing::instrument(skip(state, req), fields(quantity = req.quantity))]
pub async fn restock<S: KvStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(item): Path<String>,
    Json(req): Json<RestockRequest>,
) -> Result<Json<StockLevel>, ApiError> {
    let item = ItemId::parse(item)?;
    Ok(Json(
        state.storefront.stock.restock(&item, req.quantity).await?,
    ))
}
