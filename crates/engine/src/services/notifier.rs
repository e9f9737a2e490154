//! Best-effort notices about committed transactions.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ItemId, OrderId, SaleEventId, UserId};
use kv_store::{KvStore, StoreError};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::keys;
use crate::records::Money;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoticeKind {
    /// A participant was admitted to a flash sale.
    AdmissionSucceeded {
        event_id: SaleEventId,
        item_id: ItemId,
        participant: UserId,
        order_id: OrderId,
    },

    /// A checkout created an order.
    OrderCreated {
        order_id: OrderId,
        buyer: UserId,
        total: Money,
    },
}

/// A notice, stamped with an id and creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: NoticeKind,
}

impl Notice {
    pub fn new(kind: NoticeKind, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            at,
            kind,
        }
    }

    /// Name of the event log the notice belongs to.
    pub fn channel(&self) -> &'static str {
        match self.kind {
            NoticeKind::AdmissionSucceeded { .. } => keys::SECKILL_STREAM,
            NoticeKind::OrderCreated { .. } => keys::ORDER_STREAM,
        }
    }
}

/// Receiver of notices. Delivery is best effort: callers log failures and
/// carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: &Notice) -> Result<()>;
}

/// Appends notices as JSON to the `stream:orders` / `stream:seckill` lists.
#[derive(Debug, Clone)]
pub struct StoreNotifier<S: KvStore> {
    store: S,
}

impl<S: KvStore> StoreNotifier<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Reads back every notice in `channel`, oldest first.
    pub async fn read_channel(&self, channel: &str) -> Result<Vec<Notice>> {
        self.store
            .list_range(channel)
            .await?
            .iter()
            .map(|raw| serde_json::from_str(raw).map_err(EngineError::from))
            .collect()
    }
}

#[async_trait]
impl<S: KvStore> Notifier for StoreNotifier<S> {
    async fn notify(&self, notice: &Notice) -> Result<()> {
        let payload = serde_json::to_string(notice)?;
        self.store.list_push(notice.channel(), &payload).await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    delivered: Vec<Notice>,
    fail: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every delivery fail until switched back.
    pub async fn set_fail(&self, fail: bool) {
        self.state.write().await.fail = fail;
    }

    /// Returns the notices delivered so far.
    pub async fn delivered(&self) -> Vec<Notice> {
        self.state.read().await.delivered.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify(&self, notice: &Notice) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail {
            return Err(EngineError::StoreUnavailable(StoreError::Unavailable(
                "notification channel down".to_string(),
            )));
        }
        state.delivered.push(notice.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_store::InMemoryStore;

    fn order_created() -> Notice {
        Notice::new(
            NoticeKind::OrderCreated {
                order_id: OrderId::parse("20251111200000000000").unwrap(),
                buyer: UserId::parse("alice").unwrap(),
                total: Money::from_dollars(240),
            },
            Utc::now(),
        )
    }

    #[test]
    fn notice_serializes_with_type_tag() {
        let json = serde_json::to_value(order_created()).unwrap();
        assert_eq!(json["type"], "order_created");
        assert_eq!(json["buyer"], "alice");
        assert!(json["id"].is_string());
    }

    #[tokio::test]
    async fn store_notifier_appends_to_channel() {
        let store = InMemoryStore::new();
        let notifier = StoreNotifier::new(store.clone());
        let notice = order_created();

        notifier.notify(&notice).await.unwrap();

        assert_eq!(
            notifier.read_channel(keys::ORDER_STREAM).await.unwrap(),
            vec![notice]
        );
        assert!(store.list_range(keys::SECKILL_STREAM).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn in_memory_notifier_can_fail() {
        let notifier = InMemoryNotifier::new();
        notifier.set_fail(true).await;
        assert!(notifier.notify(&order_created()).await.is_err());
        assert!(notifier.delivered().await.is_empty());

        notifier.set_fail(false).await;
        notifier.notify(&order_created()).await.unwrap();
        assert_eq!(notifier.delivered().await.len(), 1);
    }
}
