//! Administrative stock adjustment.
//!
//! These are direct writes with no watch: the last write wins. A checkout
//! racing with an adjustment sees it as a conflict or as a shortage, never as
//! a partial commit.

use common::ItemId;
use kv_store::{KvStore, KvStoreExt};
use serde::Serialize;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::keys;

/// Stock level of an item after an adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub item: ItemId,
    pub level: i64,
}

/// Sets and tops up regular stock counters.
#[derive(Debug, Clone)]
pub struct StockAdmin<S: KvStore> {
    store: S,
}

impl<S: KvStore> StockAdmin<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Overwrites the stock counter of `item`.
    #[tracing::instrument(skip_all, fields(item = %item, level = level))]
    pub async fn set_stock(&self, item: &ItemId, level: u32) -> Result<StockLevel> {
        self.store
            .set(&keys::stock(item), &level.to_string())
            .await?;
        metrics::counter!("stock_adjustments_total", "kind" => "set").increment(1);
        info!("Stock set");
        Ok(StockLevel {
            item: item.clone(),
            level: i64::from(level),
        })
    }

    /// Adds `added` units to the stock counter of `item`.
    #[tracing::instrument(skip_all, fields(item = %item, added = added))]
    pub async fn restock(&self, item: &ItemId, added: u32) -> Result<StockLevel> {
        if added == 0 {
            return Err(EngineError::InvalidQuantity {
                item: item.to_string(),
                reason: "restock amount must be at least 1".to_string(),
            });
        }
        let level = self
            .store
            .incr_by(&keys::stock(item), i64::from(added))
            .await?;
        metrics::counter!("stock_adjustments_total", "kind" => "restock").increment(1);
        info!(level, "Stock replenished");
        Ok(StockLevel {
            item: item.clone(),
            level,
        })
    }

    /// Reads the current stock counter of `item`.
    pub async fn level(&self, item: &ItemId) -> Result<StockLevel> {
        Ok(StockLevel {
            item: item.clone(),
            level: self.store.get_counter(&keys::stock(item)).await?,
        })
    }
}
