//! Hand-off of created orders to fulfilment.

use async_trait::async_trait;
use common::OrderId;
use kv_store::KvStore;

use crate::error::Result;
use crate::keys;

/// FIFO queue consumed by the fulfilment worker.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Appends `order` to the tail of the queue.
    async fn enqueue(&self, order: &OrderId) -> Result<()>;
}

/// Work queue stored as the `queue:orders` list.
#[derive(Debug, Clone)]
pub struct StoreWorkQueue<S: KvStore> {
    store: S,
}

impl<S: KvStore> StoreWorkQueue<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the queued order ids, oldest first.
    pub async fn pending(&self) -> Result<Vec<String>> {
        Ok(self.store.list_range(keys::ORDER_QUEUE).await?)
    }
}

#[async_trait]
impl<S: KvStore> WorkQueue for StoreWorkQueue<S> {
    async fn enqueue(&self, order: &OrderId) -> Result<()> {
        self.store.list_push(keys::ORDER_QUEUE, order.as_str()).await?;
        Ok(())
    }
}
