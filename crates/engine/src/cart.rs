//! Shopping carts.
//!
//! A cart belongs to one buyer and is never contended, so it is written with
//! plain store operations. Checkout reads it once and clears it as part of
//! its commit.

use std::collections::BTreeMap;

use common::{ItemId, UserId};
use kv_store::KvStore;
use serde::Serialize;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::keys;

/// Parses a cart quantity: a positive integer.
pub fn parse_quantity(item: &str, raw: &str) -> Result<u32> {
    let invalid = |reason: &str| EngineError::InvalidQuantity {
        item: item.to_string(),
        reason: reason.to_string(),
    };
    let quantity: u32 = raw
        .trim()
        .parse()
        .map_err(|_| invalid(&format!("`{raw}` is not a whole number")))?;
    if quantity == 0 {
        return Err(invalid("must be at least 1"));
    }
    Ok(quantity)
}

/// The contents of a cart at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSnapshot {
    pub buyer: UserId,
    pub lines: BTreeMap<ItemId, u32>,
}

impl CartSnapshot {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Iterates over `(item, quantity)` lines in item order.
    pub fn lines(&self) -> impl Iterator<Item = (&ItemId, u32)> {
        self.lines.iter().map(|(item, qty)| (item, *qty))
    }
}

/// Cart records under `cart:{buyer}`.
#[derive(Debug, Clone)]
pub struct CartStore<S: KvStore> {
    store: S,
}

impl<S: KvStore> CartStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Sets the quantity of `item` in the buyer's cart.
    pub async fn put_item(&self, buyer: &UserId, item: &ItemId, quantity: u32) -> Result<()> {
        if quantity == 0 {
            return Err(EngineError::InvalidQuantity {
                item: item.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        self.store
            .hash_set(
                &keys::cart(buyer),
                &[(item.to_string(), quantity.to_string())],
            )
            .await?;
        debug!(%buyer, %item, quantity, "Cart line set");
        Ok(())
    }

    /// Removes `item` from the buyer's cart. Returns true if it was there.
    pub async fn remove_item(&self, buyer: &UserId, item: &ItemId) -> Result<bool> {
        Ok(self
            .store
            .hash_delete(&keys::cart(buyer), item.as_str())
            .await?)
    }

    /// Reads the buyer's cart, validating every line.
    pub async fn snapshot(&self, buyer: &UserId) -> Result<CartSnapshot> {
        let key = keys::cart(buyer);
        let mut lines = BTreeMap::new();
        for (raw_item, raw_qty) in self.store.hash_get_all(&key).await? {
            let item = ItemId::parse(raw_item.as_str())
                .map_err(|e| EngineError::corrupt(&key, e.to_string()))?;
            let quantity = parse_quantity(&raw_item, &raw_qty)?;
            lines.insert(item, quantity);
        }
        Ok(CartSnapshot {
            buyer: buyer.clone(),
            lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_store::InMemoryStore;

    fn buyer() -> UserId {
        UserId::parse("alice").unwrap()
    }

    fn item(id: &str) -> ItemId {
        ItemId::parse(id).unwrap()
    }

    #[test]
    fn quantities_must_be_positive_integers() {
        assert_eq!(parse_quantity("1", " 3 ").unwrap(), 3);
        for raw in ["0", "-1", "two", "1.5", ""] {
            let err = parse_quantity("1", raw).unwrap_err();
            assert!(matches!(err, EngineError::InvalidQuantity { .. }), "{raw:?}");
        }
    }

    #[tokio::test]
    async fn put_overwrites_and_remove_deletes() {
        let carts = CartStore::new(InMemoryStore::new());
        carts.put_item(&buyer(), &item("1"), 2).await.unwrap();
        carts.put_item(&buyer(), &item("1"), 5).await.unwrap();
        carts.put_item(&buyer(), &item("2"), 1).await.unwrap();

        let cart = carts.snapshot(&buyer()).await.unwrap();
        assert_eq!(
            cart.lines().collect::<Vec<_>>(),
            vec![(&item("1"), 5), (&item("2"), 1)]
        );

        assert!(carts.remove_item(&buyer(), &item("1")).await.unwrap());
        assert!(!carts.remove_item(&buyer(), &item("1")).await.unwrap());
        assert_eq!(carts.snapshot(&buyer()).await.unwrap().lines.len(), 1);
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected() {
        let carts = CartStore::new(InMemoryStore::new());
        let err = carts.put_item(&buyer(), &item("1"), 0).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn non_numeric_stored_quantity_is_invalid() {
        let store = InMemoryStore::new();
        store
            .hash_set("cart:alice", &[("1".to_string(), "many".to_string())])
            .await
            .unwrap();
        let carts = CartStore::new(store);

        let err = carts.snapshot(&buyer()).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidQuantity { .. }));
    }

    #[tokio::test]
    async fn missing_cart_is_empty() {
        let carts = CartStore::new(InMemoryStore::new());
        assert!(carts.snapshot(&buyer()).await.unwrap().is_empty());
    }
}
