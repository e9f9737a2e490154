use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use common::{ItemId, OrderId, SaleEventId, UserId};
use serde::{Deserialize, Serialize};

use super::{Money, required};
use crate::error::{EngineError, Result};

/// Lifecycle status of a checkout order.
///
/// The engine only ever writes `Created`; the fulfilment worker moves orders
/// to `Processed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Processed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "created",
            OrderStatus::Processed => "processed",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "created" => Some(OrderStatus::Created),
            "processed" => Some(OrderStatus::Processed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A checkout order.
///
/// The total is computed once at checkout time and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub buyer: UserId,
    pub items: BTreeMap<ItemId, u32>,
    pub total: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Encodes the order as hash fields.
    pub fn to_fields(&self) -> Result<Vec<(String, String)>> {
        Ok(vec![
            ("user_id".to_string(), self.buyer.to_string()),
            ("items".to_string(), serde_json::to_string(&self.items)?),
            ("total".to_string(), self.total.to_decimal_string()),
            ("status".to_string(), self.status.as_str().to_string()),
            ("created_at".to_string(), self.created_at.to_rfc3339()),
        ])
    }

    /// Decodes an order from the hash stored at `key`.
    pub fn from_fields(id: OrderId, key: &str, fields: &BTreeMap<String, String>) -> Result<Self> {
        let buyer = UserId::parse(required(key, fields, "user_id")?)
            .map_err(|e| EngineError::corrupt(key, e.to_string()))?;
        let items: BTreeMap<ItemId, u32> = serde_json::from_str(required(key, fields, "items")?)
            .map_err(|e| EngineError::corrupt(key, format!("items: {e}")))?;
        let total = Money::parse_decimal(required(key, fields, "total")?)
            .ok_or_else(|| EngineError::corrupt(key, "total is not a decimal amount"))?;
        let raw_status = required(key, fields, "status")?;
        let status = OrderStatus::parse(raw_status)
            .ok_or_else(|| EngineError::corrupt(key, format!("unknown status `{raw_status}`")))?;
        let created_at = parse_timestamp(key, required(key, fields, "created_at")?)?;

        Ok(Self {
            id,
            buyer,
            items,
            total,
            status,
            created_at,
        })
    }
}

/// Record of a successful flash-sale admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionOrder {
    pub id: OrderId,
    pub participant: UserId,
    pub event_id: SaleEventId,
    pub item_id: ItemId,
    pub created_at: DateTime<Utc>,
}

impl AdmissionOrder {
    /// Encodes the admission order as hash fields.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("user_id".to_string(), self.participant.to_string()),
            ("event_id".to_string(), self.event_id.to_string()),
            ("product_id".to_string(), self.item_id.to_string()),
            ("created_at".to_string(), self.created_at.to_rfc3339()),
        ]
    }

    /// Decodes an admission order from the hash stored at `key`.
    pub fn from_fields(id: OrderId, key: &str, fields: &BTreeMap<String, String>) -> Result<Self> {
        let corrupt = |e: common::IdError| EngineError::corrupt(key, e.to_string());
        Ok(Self {
            id,
            participant: UserId::parse(required(key, fields, "user_id")?).map_err(corrupt)?,
            event_id: SaleEventId::parse(required(key, fields, "event_id")?).map_err(corrupt)?,
            item_id: ItemId::parse(required(key, fields, "product_id")?).map_err(corrupt)?,
            created_at: parse_timestamp(key, required(key, fields, "created_at")?)?,
        })
    }
}

fn parse_timestamp(key: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| EngineError::corrupt(key, format!("created_at: {e}")))
}

/// Generates time-derived order ids (`%Y%m%d%H%M%S` plus microseconds).
///
/// Ids from one generator are strictly increasing: two requests in the same
/// microsecond get consecutive microsecond stamps. Uniqueness only holds
/// within the process.
#[derive(Debug, Default)]
pub struct OrderIdGenerator {
    prefix: &'static str,
    last_micros: AtomicI64,
}

impl OrderIdGenerator {
    /// Creates a generator for plain checkout ids.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a generator whose ids start with `prefix`.
    pub fn with_prefix(prefix: &'static str) -> Self {
        Self {
            prefix,
            last_micros: AtomicI64::new(0),
        }
    }

    /// Returns the next id for an order created at `now`.
    pub fn next(&self, now: DateTime<Utc>) -> Result<OrderId> {
        let wanted = now.timestamp_micros();
        let mut last = self.last_micros.load(Ordering::Acquire);
        let micros = loop {
            let candidate = wanted.max(last + 1);
            match self.last_micros.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break candidate,
                Err(actual) => last = actual,
            }
        };
        let stamp = DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or(now);
        Ok(OrderId::parse(format!(
            "{}{}",
            self.prefix,
            stamp.format("%Y%m%d%H%M%S%6f")
        ))?)
    }
}
