use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::{CommitOutcome, Result, StoreError, Transaction};

/// Core trait for key-value store implementations.
///
/// Plain operations apply immediately and are individually atomic. Multi-key
/// atomicity is only available through [`KvStore::watch`]: stage a
/// [`Transaction`] and hand it to [`WatchGuard::exec`].
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Handle for an open watch session.
    type Guard: WatchGuard;

    /// Reads a string value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Overwrites a string value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Adds `delta` to an integer counter and returns the new value.
    ///
    /// A missing counter is treated as zero.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;

    /// Removes a key. Returns true if it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Adds a member to a set. Returns true if it was not already present.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Checks set membership.
    async fn set_contains(&self, key: &str, member: &str) -> Result<bool>;

    /// Returns all members of a set, sorted.
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Returns the number of members of a set.
    async fn set_len(&self, key: &str) -> Result<usize>;

    /// Appends to a list and returns its new length.
    async fn list_push(&self, key: &str, value: &str) -> Result<usize>;

    /// Returns the whole list, oldest entry first.
    async fn list_range(&self, key: &str) -> Result<Vec<String>>;

    /// Writes fields into a hash.
    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<()>;

    /// Removes a field from a hash. Returns true if it existed.
    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool>;

    /// Returns every field of a hash. A missing hash is empty.
    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>>;

    /// Starts watching `keys`.
    ///
    /// The returned guard remembers the state of every key at this moment; a
    /// later [`WatchGuard::exec`] reports [`CommitOutcome::Conflict`] if any of
    /// them was written in between, by anyone.
    async fn watch(&self, keys: &[String]) -> Result<Self::Guard>;
}

/// An open watch session.
///
/// Reads made through the guard observe the current value of the store; the
/// watch only decides whether the final [`exec`](WatchGuard::exec) succeeds.
/// Dropping the guard without calling `exec` or `unwatch` cancels the watch.
#[async_trait]
pub trait WatchGuard: Send {
    /// Returns the watched keys.
    fn keys(&self) -> &[String];

    /// Reads a string value.
    async fn get(&mut self, key: &str) -> Result<Option<String>>;

    /// Checks set membership.
    async fn set_contains(&mut self, key: &str, member: &str) -> Result<bool>;

    /// Returns the number of members of a set.
    async fn set_len(&mut self, key: &str) -> Result<usize>;

    /// Applies `txn` atomically if no watched key changed, ending the session.
    async fn exec(self, txn: Transaction) -> Result<CommitOutcome>;

    /// Cancels the watch without writing anything.
    async fn unwatch(self) -> Result<()>;
}

/// Extension trait providing convenience methods for stores.
#[async_trait]
pub trait KvStoreExt: KvStore {
    /// Reads an integer counter, treating a missing key as zero.
    async fn get_counter(&self, key: &str) -> Result<i64> {
        parse_counter(key, self.get(key).await?)
    }
}

// Blanket implementation for all KvStore implementations
impl<T: KvStore + ?Sized> KvStoreExt for T {}

/// Parses the raw value of a counter key. A missing key counts as zero.
pub fn parse_counter(key: &str, raw: Option<String>) -> Result<i64> {
    match raw {
        None => Ok(0),
        Some(value) => value
            .trim()
            .parse::<i64>()
            .map_err(|_| StoreError::NotAnInteger {
                key: key.to_string(),
                value,
            }),
    }
}
