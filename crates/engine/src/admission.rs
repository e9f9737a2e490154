//! Flash-sale admission control.

use std::sync::Arc;

use common::{OrderId, SaleEventId, UserId};
use kv_store::KvStore;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::coordinator::{ConflictPolicy, Coordinator, Decision, TxnOutcome, WatchSet};
use crate::error::{EngineError, Result};
use crate::keys;
use crate::records::{AdmissionOrder, OrderIdGenerator};
use crate::services::{EventConfigSource, Notice, NoticeKind, Notifier};

/// Prefix of admission order ids, keeping them apart from checkout ids.
pub const ADMISSION_ID_PREFIX: &str = "SK";

/// Result of an admission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdmissionOutcome {
    /// The participant got one unit of quota.
    Admitted { order_id: OrderId },

    /// No quota left, or the attempt lost a race for the last units.
    QuotaExhausted,

    /// The participant was admitted earlier.
    AlreadyAdmitted,

    /// The request arrived outside the sale window.
    EventClosed,
}

impl AdmissionOutcome {
    fn label(&self) -> &'static str {
        match self {
            AdmissionOutcome::Admitted { .. } => "admitted",
            AdmissionOutcome::QuotaExhausted => "quota_exhausted",
            AdmissionOutcome::AlreadyAdmitted => "already_admitted",
            AdmissionOutcome::EventClosed => "event_closed",
        }
    }
}

/// Admits participants to flash-sale events.
///
/// Each participant can be admitted at most once per event and the number of
/// admissions never exceeds the event's quota, no matter how many callers
/// race.
pub struct AdmissionControl<S, C, N>
where
    S: KvStore,
    C: EventConfigSource,
    N: Notifier,
{
    coordinator: Coordinator<S>,
    configs: C,
    notifier: N,
    clock: Arc<dyn Clock>,
    policy: ConflictPolicy,
    ids: OrderIdGenerator,
}

impl<S, C, N> AdmissionControl<S, C, N>
where
    S: KvStore,
    C: EventConfigSource,
    N: Notifier,
{
    /// Creates admission control with wall-clock time and no retries.
    pub fn new(store: S, configs: C, notifier: N) -> Self {
        Self {
            coordinator: Coordinator::new(store),
            configs,
            notifier,
            clock: Arc::new(SystemClock),
            policy: ConflictPolicy::ReturnConflict,
            ids: OrderIdGenerator::with_prefix(ADMISSION_ID_PREFIX),
        }
    }

    /// Replaces the conflict policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the conflict policy in use.
    pub fn policy(&self) -> &ConflictPolicy {
        &self.policy
    }

    /// Tries to admit `participant` to `event_id`.
    ///
    /// A participant that already holds a slot gets `AlreadyAdmitted` for as
    /// long as the window is open, even once the quota is gone. A lost commit
    /// race is reported as `QuotaExhausted`.
    ///
    /// Membership is checked before the remaining quota on purpose, so a retry
    /// by an admitted participant stays `AlreadyAdmitted` after sell-out.
    #[tracing::instrument(skip_all, fields(event_id = %event_id, participant = %participant))]
    pub async fn admit(
        &self,
        event_id: &SaleEventId,
        participant: &UserId,
    ) -> Result<AdmissionOutcome> {
        let config = self
            .configs
            .event_config(event_id)
            .await?
            .ok_or_else(|| EngineError::UnknownEvent(event_id.clone()))?;

        let now = self.clock.now();
        if !config.window.contains(now) {
            debug!(%now, "Admission outside sale window");
            return Ok(self.record(AdmissionOutcome::EventClosed));
        }

        let remaining_key = keys::sale_remaining(event_id);
        let participants_key = keys::sale_participants(event_id);
        let watch = WatchSet::new()
            .value(&remaining_key)
            .membership(&participants_key, participant.as_str());

        let outcome = self
            .coordinator
            .execute(
                &watch,
                &self.policy,
                |snapshot| {
                    if snapshot.contains(&participants_key, participant.as_str()) {
                        return Ok(Decision::Abort(AdmissionOutcome::AlreadyAdmitted));
                    }
                    if snapshot.counter(&remaining_key)? <= 0 {
                        return Ok(Decision::Abort(AdmissionOutcome::QuotaExhausted));
                    }
                    Ok(Decision::Commit(()))
                },
                |(), txn| {
                    let created_at = self.clock.now();
                    let order = AdmissionOrder {
                        id: self.ids.next(created_at)?,
                        participant: participant.clone(),
                        event_id: event_id.clone(),
                        item_id: config.item_id.clone(),
                        created_at,
                    };
                    txn.decr_by(&remaining_key, 1)
                        .set_add(&participants_key, participant.as_str())
                        .hash_set(keys::sale_order(&order.id), order.to_fields())
                        .list_push(keys::sale_orders(event_id), order.id.as_str())
                        .list_push(keys::user_sale_orders(participant), order.id.as_str());
                    Ok(order)
                },
            )
            .await?;

        let outcome = match outcome {
            TxnOutcome::Committed(order) => {
                info!(order_id = %order.id, "Participant admitted");
                self.announce(&order).await;
                AdmissionOutcome::Admitted { order_id: order.id }
            }
            TxnOutcome::Aborted(outcome) => outcome,
            TxnOutcome::Conflict => {
                debug!("Admission lost a commit race, reporting quota exhausted");
                AdmissionOutcome::QuotaExhausted
            }
        };
        Ok(self.record(outcome))
    }

    async fn announce(&self, order: &AdmissionOrder) {
        let notice = Notice::new(
            NoticeKind::AdmissionSucceeded {
                event_id: order.event_id.clone(),
                item_id: order.item_id.clone(),
                participant: order.participant.clone(),
                order_id: order.id.clone(),
            },
            order.created_at,
        );
        if let Err(e) = self.notifier.notify(&notice).await {
            warn!(order_id = %order.id, error = %e, "Failed to deliver admission notice");
        }
    }

    fn record(&self, outcome: AdmissionOutcome) -> AdmissionOutcome {
        metrics::counter!("admissions_total", "outcome" => outcome.label()).increment(1);
        outcome
    }
}
