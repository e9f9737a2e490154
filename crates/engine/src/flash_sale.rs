//! Flash-sale administration and status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{SaleEventId, UserId};
use kv_store::{CommitOutcome, KvStore, KvStoreExt, Transaction, WatchGuard};
use serde::Serialize;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::coordinator::{ConflictPolicy, Coordinator, Decision, RetryPolicy, TxnOutcome, WatchSet};
use crate::error::{EngineError, Result};
use crate::keys;
use crate::records::FlashSaleConfig;
use crate::services::{EventConfigSource, StoreEventConfig};

/// Attempts allowed when resizing a quota races with admissions.
const RESIZE_ATTEMPTS: u32 = 5;

/// Ledger state of one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashSaleStatus {
    pub config: FlashSaleConfig,
    pub remaining: i64,
    pub admitted: Vec<UserId>,
    /// Admitted participants plus remaining units.
    pub total_quota: i64,
    pub open_now: bool,
    pub checked_at: DateTime<Utc>,
}

/// Result of a quota resize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QuotaResize {
    /// The new quota is in place.
    Resized {
        quota: u32,
        remaining: i64,
        admitted: usize,
    },

    /// Admissions kept winning the race; nothing changed.
    Conflict,
}

/// Creates flash-sale events and maintains their quota.
pub struct FlashSaleAdmin<S: KvStore> {
    coordinator: Coordinator<S>,
    configs: StoreEventConfig<S>,
    clock: Arc<dyn Clock>,
}

impl<S: KvStore + Clone> FlashSaleAdmin<S> {
    pub fn new(store: S) -> Self {
        Self {
            configs: StoreEventConfig::new(store.clone()),
            coordinator: Coordinator::new(store),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source used for the open-now flag.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Writes the event configuration and resets its ledger to a full quota
    /// with no participants.
    ///
    /// Recreating a live event wipes its admissions; previous admission
    /// orders stay on record.
    #[tracing::instrument(skip_all, fields(event_id = %config.event_id, quota = config.quota))]
    pub async fn create_event(&self, config: &FlashSaleConfig) -> Result<()> {
        if config.quota == 0 {
            return Err(EngineError::Validation("quota must be positive".to_string()));
        }
        config.window.validate()?;

        let event_id = &config.event_id;
        let mut txn = Transaction::new();
        txn.delete(keys::sale_config(event_id))
            .hash_set(keys::sale_config(event_id), config.to_fields())
            .set(keys::sale_remaining(event_id), config.quota.to_string())
            .delete(keys::sale_participants(event_id))
            .set_add(keys::SALE_EVENTS, event_id.as_str());

        // Empty watch: the batch is applied atomically and cannot conflict.
        let guard = self.coordinator.store().watch(&[]).await?;
        match guard.exec(txn).await? {
            CommitOutcome::Committed => {
                info!("Flash-sale event created");
                Ok(())
            }
            CommitOutcome::Conflict => Err(EngineError::StoreUnavailable(
                kv_store::StoreError::Unavailable(
                    "unwatched batch reported a conflict".to_string(),
                ),
            )),
        }
    }

    /// Changes the quota of an event, keeping its admissions.
    ///
    /// Remaining becomes `quota - admitted`. A quota below the number of
    /// participants already admitted is rejected and leaves the ledger as it
    /// was. The read of the ledger and the write of the new values are
    /// coordinated, so admissions racing with the resize can never be lost.
    #[tracing::instrument(skip_all, fields(event_id = %event_id, quota = quota))]
    pub async fn resize_quota(&self, event_id: &SaleEventId, quota: u32) -> Result<QuotaResize> {
        if quota == 0 {
            return Err(EngineError::Validation("quota must be positive".to_string()));
        }
        let config = self
            .configs
            .event_config(event_id)
            .await?
            .ok_or_else(|| EngineError::UnknownEvent(event_id.clone()))?;

        let remaining_key = keys::sale_remaining(event_id);
        let participants_key = keys::sale_participants(event_id);
        let config_key = keys::sale_config(event_id);
        let watch = WatchSet::new()
            .value(&remaining_key)
            .cardinality(&participants_key);
        let policy = ConflictPolicy::AutoRetry(RetryPolicy::new(RESIZE_ATTEMPTS));

        let outcome = self
            .coordinator
            .execute(
                &watch,
                &policy,
                |snapshot| {
                    let admitted = snapshot.cardinality(&participants_key);
                    if admitted > quota as usize {
                        return Ok(Decision::Abort(admitted));
                    }
                    Ok(Decision::Commit((admitted, i64::from(quota) - admitted as i64)))
                },
                |(admitted, remaining), txn| {
                    txn.set(&remaining_key, remaining.to_string())
                        .hash_set(&config_key, [("quota", quota.to_string())]);
                    Ok(QuotaResize::Resized {
                        quota,
                        remaining,
                        admitted,
                    })
                },
            )
            .await?;

        Ok(match outcome {
            TxnOutcome::Committed(resized) => {
                info!(old_quota = config.quota, ?resized, "Quota resized");
                resized
            }
            TxnOutcome::Aborted(admitted) => {
                return Err(EngineError::Validation(format!(
                    "quota {quota} is below the {admitted} participants already admitted"
                )));
            }
            TxnOutcome::Conflict => QuotaResize::Conflict,
        })
    }

    /// Returns the ledger state of an event.
    pub async fn event_status(&self, event_id: &SaleEventId) -> Result<FlashSaleStatus> {
        let config = self
            .configs
            .event_config(event_id)
            .await?
            .ok_or_else(|| EngineError::UnknownEvent(event_id.clone()))?;
        let store = self.coordinator.store();
        let remaining = store.get_counter(&keys::sale_remaining(event_id)).await?;
        let participants_key = keys::sale_participants(event_id);
        let admitted = store
            .set_members(&participants_key)
            .await?
            .into_iter()
            .map(|raw| {
                UserId::parse(raw).map_err(|e| EngineError::corrupt(&participants_key, e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let checked_at = self.clock.now();
        Ok(FlashSaleStatus {
            open_now: config.window.contains(checked_at),
            total_quota: admitted.len() as i64 + remaining,
            config,
            remaining,
            admitted,
            checked_at,
        })
    }

    /// Returns the status of every configured event.
    pub async fn all_statuses(&self) -> Result<Vec<FlashSaleStatus>> {
        let mut statuses = Vec::new();
        for event_id in self.configs.event_ids().await? {
            statuses.push(self.event_status(&event_id).await?);
        }
        Ok(statuses)
    }
}
