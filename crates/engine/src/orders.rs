//! Read-only views of the orders the engine created.

use common::{OrderId, SaleEventId, UserId};
use kv_store::KvStore;

use crate::error::{EngineError, Result};
use crate::keys;
use crate::records::{AdmissionOrder, Order};

/// Looks up checkout and admission orders.
#[derive(Debug, Clone)]
pub struct OrderBook<S: KvStore> {
    store: S,
}

impl<S: KvStore> OrderBook<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a checkout order, or `None` if it does not exist.
    pub async fn order(&self, id: &OrderId) -> Result<Option<Order>> {
        let key = keys::order(id);
        let fields = self.store.hash_get_all(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Order::from_fields(id.clone(), &key, &fields).map(Some)
    }

    /// Returns an admission order, or `None` if it does not exist.
    pub async fn admission_order(&self, id: &OrderId) -> Result<Option<AdmissionOrder>> {
        let key = keys::sale_order(id);
        let fields = self.store.hash_get_all(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        AdmissionOrder::from_fields(id.clone(), &key, &fields).map(Some)
    }

    /// Returns the buyer's checkout orders, newest first.
    pub async fn orders_for(&self, buyer: &UserId) -> Result<Vec<Order>> {
        let mut orders = Vec::new();
        for id in self.history(&keys::user_orders(buyer)).await? {
            if let Some(order) = self.order(&id).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    /// Returns the participant's admission orders, newest first.
    pub async fn admission_orders_for(&self, participant: &UserId) -> Result<Vec<AdmissionOrder>> {
        let mut orders = Vec::new();
        for id in self.history(&keys::user_sale_orders(participant)).await? {
            if let Some(order) = self.admission_order(&id).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    /// Returns the admission order ids of an event, in admission order.
    pub async fn event_admissions(&self, event: &SaleEventId) -> Result<Vec<OrderId>> {
        let key = keys::sale_orders(event);
        self.store
            .list_range(&key)
            .await?
            .into_iter()
            .map(|raw| OrderId::parse(raw).map_err(|e| EngineError::corrupt(&key, e.to_string())))
            .collect()
    }

    async fn history(&self, key: &str) -> Result<Vec<OrderId>> {
        self.store
            .list_range(key)
            .await?
            .into_iter()
            .rev()
            .map(|raw| OrderId::parse(raw).map_err(|e| EngineError::corrupt(key, e.to_string())))
            .collect()
    }
}
