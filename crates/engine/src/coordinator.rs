//! Optimistic transaction coordination.
//!
//! Every read-then-write of contended state goes through
//! [`Coordinator::execute`]: it watches the declared keys, reads them into a
//! [`Snapshot`], asks the caller to validate, stages the caller's mutations and
//! commits them only if no watched key changed in between.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use kv_store::{CommitOutcome, KvStore, Transaction, WatchGuard, parse_counter};
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Read {
    Value(String),
    Member { key: String, member: String },
    Cardinality(String),
}

/// Keys a transaction depends on, plus the reads its validation needs.
///
/// Every key that is read is also watched.
#[derive(Debug, Clone, Default)]
pub struct WatchSet {
    keys: Vec<String>,
    reads: Vec<Read>,
}

impl WatchSet {
    /// Creates an empty watch set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Watches `key` and reads its string value.
    pub fn value(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.add_key(&key);
        self.reads.push(Read::Value(key));
        self
    }

    /// Watches the set at `key` and checks whether `member` belongs to it.
    pub fn membership(mut self, key: impl Into<String>, member: impl Into<String>) -> Self {
        let key = key.into();
        self.add_key(&key);
        self.reads.push(Read::Member {
            key,
            member: member.into(),
        });
        self
    }

    /// Watches the set at `key` and reads its size.
    pub fn cardinality(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.add_key(&key);
        self.reads.push(Read::Cardinality(key));
        self
    }

    /// Returns the watched keys, without duplicates.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    fn add_key(&mut self, key: &str) {
        if !self.keys.iter().any(|k| k == key) {
            self.keys.push(key.to_string());
        }
    }
}

/// Values read under watch, handed to the validation step.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    values: HashMap<String, Option<String>>,
    members: HashSet<(String, String)>,
    cardinalities: HashMap<String, usize>,
}

impl Snapshot {
    /// Returns the raw value read for `key`.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_deref())
    }

    /// Returns the integer counter read for `key`; a missing key counts as zero.
    pub fn counter(&self, key: &str) -> Result<i64> {
        Ok(parse_counter(key, self.value(key).map(str::to_string))?)
    }

    /// Returns true if `member` was in the set at `key`.
    pub fn contains(&self, key: &str, member: &str) -> bool {
        self.members
            .contains(&(key.to_string(), member.to_string()))
    }

    /// Returns the size read for the set at `key`.
    pub fn cardinality(&self, key: &str) -> usize {
        self.cardinalities.get(key).copied().unwrap_or(0)
    }
}

/// What the validation step decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision<P, R> {
    /// Proceed to the mutation step with `P`.
    Commit(P),

    /// Stop without writing anything, reporting `R`.
    Abort(R),
}

/// Result of a coordinated transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOutcome<T, R> {
    /// The mutations were applied; carries what the mutation step returned.
    Committed(T),

    /// Validation aborted; nothing was written.
    Aborted(R),

    /// A watched key changed before commit and the policy gave up.
    Conflict,
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap for the exponential backoff.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_attempts` attempts with no delay
    /// between them. Zero is raised to one.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the backoff cap.
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Delay before retry number `retry` (zero-based).
    ///
    /// delay = initial_delay * multiplier ^ retry, capped at `max_delay`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 || self.initial_delay.is_zero() {
            return self.initial_delay.min(self.max_delay);
        }
        let factor = self.multiplier.powi(retry.min(i32::MAX as u32) as i32);
        let delay_ms = self.initial_delay.as_millis() as f64 * factor;
        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }
        Duration::from_millis(delay_ms as u64)
    }
}

/// What to do when a commit loses a race.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConflictPolicy {
    /// Report the conflict to the caller after one attempt.
    #[default]
    ReturnConflict,

    /// Re-run the whole transaction, up to the policy's attempt bound.
    AutoRetry(RetryPolicy),
}

impl ConflictPolicy {
    /// Returns the maximum number of attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        match self {
            ConflictPolicy::ReturnConflict => 1,
            ConflictPolicy::AutoRetry(retry) => retry.max_attempts,
        }
    }
}

enum Attempt<T, R> {
    Done(TxnOutcome<T, R>),
    Conflict,
}

/// Runs watch / validate / mutate / commit cycles against a store.
#[derive(Debug, Clone)]
pub struct Coordinator<S: KvStore> {
    store: S,
}

impl<S: KvStore> Coordinator<S> {
    /// Creates a coordinator over `store`.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Executes one optimistic transaction.
    ///
    /// `validate` sees a snapshot of the watched state and decides whether to
    /// commit. On `Commit`, `mutate` stages writes into the transaction and
    /// returns the value reported on success. Under `AutoRetry` both closures
    /// run again for each attempt, against a fresh snapshot.
    ///
    /// Store failures abort the call with an error and are never retried.
    #[tracing::instrument(skip_all, fields(keys = ?watch.keys()))]
    pub async fn execute<P, R, T, V, M>(
        &self,
        watch: &WatchSet,
        policy: &ConflictPolicy,
        mut validate: V,
        mut mutate: M,
    ) -> Result<TxnOutcome<T, R>>
    where
        V: FnMut(&Snapshot) -> Result<Decision<P, R>> + Send,
        M: FnMut(P, &mut Transaction) -> Result<T> + Send,
        P: Send,
        R: Send,
        T: Send,
    {
        let max_attempts = policy.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            metrics::counter!("coordinator_attempts").increment(1);

            match self.attempt(watch, &mut validate, &mut mutate).await? {
                Attempt::Done(outcome) => return Ok(outcome),
                Attempt::Conflict => {
                    metrics::counter!("coordinator_conflicts_total").increment(1);

                    let retry = match policy {
                        ConflictPolicy::AutoRetry(retry) if attempt < max_attempts => retry,
                        _ => {
                            debug!(attempt, "Transaction conflicted, giving up");
                            return Ok(TxnOutcome::Conflict);
                        }
                    };

                    let delay = retry.delay_for_retry(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Transaction conflicted, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    async fn attempt<P, R, T, V, M>(
        &self,
        watch: &WatchSet,
        validate: &mut V,
        mutate: &mut M,
    ) -> Result<Attempt<T, R>>
    where
        V: FnMut(&Snapshot) -> Result<Decision<P, R>> + Send,
        M: FnMut(P, &mut Transaction) -> Result<T> + Send,
        P: Send,
        R: Send,
        T: Send,
    {
        let mut guard = self.store.watch(watch.keys()).await?;
        let snapshot = read_snapshot(&mut guard, watch).await?;

        match validate(&snapshot)? {
            Decision::Abort(reason) => {
                if let Err(e) = guard.unwatch().await {
                    warn!(error = %e, "Failed to release watch after abort");
                }
                Ok(Attempt::Done(TxnOutcome::Aborted(reason)))
            }
            Decision::Commit(plan) => {
                let mut txn = Transaction::new();
                let value = mutate(plan, &mut txn)?;
                match guard.exec(txn).await? {
                    CommitOutcome::Committed => Ok(Attempt::Done(TxnOutcome::Committed(value))),
                    CommitOutcome::Conflict => Ok(Attempt::Conflict),
                }
            }
        }
    }
}

async fn read_snapshot<G: WatchGuard>(guard: &mut G, watch: &WatchSet) -> Result<Snapshot> {
    let mut snapshot = Snapshot::default();
    for read in &watch.reads {
        match read {
            Read::Value(key) => {
                let value = guard.get(key).await?;
                snapshot.values.insert(key.clone(), value);
            }
            Read::Member { key, member } => {
                if guard.set_contains(key, member).await? {
                    snapshot.members.insert((key.clone(), member.clone()));
                }
            }
            Read::Cardinality(key) => {
                let len = guard.set_len(key).await?;
                snapshot.cardinalities.insert(key.clone(), len);
            }
        }
    }
    Ok(snapshot)
}
