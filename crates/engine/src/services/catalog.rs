//! Item prices.

use async_trait::async_trait;
use common::ItemId;
use kv_store::KvStore;

use crate::error::{EngineError, Result};
use crate::keys;
use crate::records::Money;

/// Source of unit prices.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Returns the unit price of `item`, or `None` if the catalog does not
    /// list it.
    async fn unit_price(&self, item: &ItemId) -> Result<Option<Money>>;
}

/// Catalog backed by `product:{item}` hashes with a decimal `price` field.
#[derive(Debug, Clone)]
pub struct StoreCatalog<S: KvStore> {
    store: S,
}

impl<S: KvStore> StoreCatalog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Lists an item with a display name and unit price.
    pub async fn register(&self, item: &ItemId, name: &str, price: Money) -> Result<()> {
        if price.is_negative() {
            return Err(EngineError::Validation(format!(
                "price of {item} must not be negative"
            )));
        }
        self.store
            .hash_set(
                &keys::product(item),
                &[
                    ("name".to_string(), name.to_string()),
                    ("price".to_string(), price.to_decimal_string()),
                ],
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<S: KvStore> Catalog for StoreCatalog<S> {
    async fn unit_price(&self, item: &ItemId) -> Result<Option<Money>> {
        let key = keys::product(item);
        let fields = self.store.hash_get_all(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let raw = fields
            .get("price")
            .ok_or_else(|| EngineError::corrupt(&key, "missing field `price`"))?;
        Money::parse_decimal(raw)
            .map(Some)
            .ok_or_else(|| EngineError::corrupt(&key, format!("price `{raw}` is not a decimal amount")))
    }
}
