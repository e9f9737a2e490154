//! Flash-sale event configuration.

use async_trait::async_trait;
use common::SaleEventId;
use kv_store::KvStore;

use crate::error::{EngineError, Result};
use crate::keys;
use crate::records::FlashSaleConfig;

/// Source of flash-sale event configuration. Read afresh on every call.
#[async_trait]
pub trait EventConfigSource: Send + Sync {
    /// Returns the configuration of `event`, or `None` if it does not exist.
    async fn event_config(&self, event: &SaleEventId) -> Result<Option<FlashSaleConfig>>;
}

/// Configuration stored as `seckill:event:{id}` hashes, with the set of
/// known ids under `seckill:events`.
#[derive(Debug, Clone)]
pub struct StoreEventConfig<S: KvStore> {
    store: S,
}

impl<S: KvStore> StoreEventConfig<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the ids of every configured event, sorted.
    pub async fn event_ids(&self) -> Result<Vec<SaleEventId>> {
        self.store
            .set_members(keys::SALE_EVENTS)
            .await?
            .into_iter()
            .map(|raw| {
                SaleEventId::parse(raw)
                    .map_err(|e| EngineError::corrupt(keys::SALE_EVENTS, e.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl<S: KvStore> EventConfigSource for StoreEventConfig<S> {
    async fn event_config(&self, event: &SaleEventId) -> Result<Option<FlashSaleConfig>> {
        let key = keys::sale_config(event);
        let fields = self.store.hash_get_all(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        FlashSaleConfig::from_fields(event.clone(), &key, &fields).map(Some)
    }
}
