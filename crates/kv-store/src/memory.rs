use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    CommitOutcome, Mutation, Result, StoreError, Transaction, Version,
    store::{KvStore, WatchGuard, parse_counter},
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
    List(Vec<String>),
    Hash(BTreeMap<String, String>),
}

#[derive(Debug, Default)]
struct Inner {
    data: HashMap<String, Value>,
    versions: HashMap<String, Version>,
    clock: u64,
    unavailable: bool,
    injected_conflicts: usize,
}

impl Inner {
    fn ensure_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(StoreError::Unavailable(
                "in-memory store switched offline".to_string(),
            ));
        }
        Ok(())
    }

    fn version_of(&self, key: &str) -> Version {
        self.versions
            .get(key)
            .copied()
            .unwrap_or(Version::initial())
    }

    fn touch(&mut self, key: &str) {
        self.clock += 1;
        self.versions
            .insert(key.to_string(), Version::new(self.clock));
    }

    /// Applies mutations all-or-nothing: they run against scratch copies of
    /// the affected keys and are only written back if every one succeeds.
    fn apply_all(&mut self, mutations: Vec<Mutation>) -> Result<()> {
        let mut staged: Vec<(String, Option<Value>, bool)> = Vec::new();

        for mutation in mutations {
            let key = mutation.key().to_string();
            let index = match staged.iter().position(|(k, _, _)| *k == key) {
                Some(index) => index,
                None => {
                    let current = self.data.get(&key).cloned();
                    let existed = current.is_some();
                    staged.push((key.clone(), current, existed));
                    staged.len() - 1
                }
            };
            apply_mutation(&key, &mut staged[index].1, mutation)?;
        }

        for (key, slot, existed) in staged {
            match slot {
                Some(value) => {
                    self.data.insert(key.clone(), value);
                    self.touch(&key);
                }
                None => {
                    self.data.remove(&key);
                    if existed {
                        self.touch(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn get_str(&self, key: &str) -> Result<Option<String>> {
        match self.data.get(key) {
            None => Ok(None),
            Some(Value::Str(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key, "string")),
        }
    }

    fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        match self.data.get(key) {
            None => Ok(false),
            Some(Value::Set(members)) => Ok(members.contains(member)),
            Some(_) => Err(wrong_type(key, "set")),
        }
    }

    fn set_len(&self, key: &str) -> Result<usize> {
        match self.data.get(key) {
            None => Ok(0),
            Some(Value::Set(members)) => Ok(members.len()),
            Some(_) => Err(wrong_type(key, "set")),
        }
    }
}

fn wrong_type(key: &str, expected: &'static str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
    }
}

fn apply_mutation(key: &str, slot: &mut Option<Value>, mutation: Mutation) -> Result<()> {
    match mutation {
        Mutation::Set { value, .. } => *slot = Some(Value::Str(value)),
        Mutation::IncrBy { delta, .. } => {
            let raw = match slot {
                None => None,
                Some(Value::Str(value)) => Some(value.clone()),
                Some(_) => return Err(wrong_type(key, "string")),
            };
            let current = parse_counter(key, raw)?;
            *slot = Some(Value::Str((current + delta).to_string()));
        }
        Mutation::SetAdd { member, .. } => match slot {
            None => *slot = Some(Value::Set(BTreeSet::from([member]))),
            Some(Value::Set(members)) => {
                members.insert(member);
            }
            Some(_) => return Err(wrong_type(key, "set")),
        },
        Mutation::ListPush { value, .. } => match slot {
            None => *slot = Some(Value::List(vec![value])),
            Some(Value::List(items)) => items.push(value),
            Some(_) => return Err(wrong_type(key, "list")),
        },
        Mutation::HashSet { fields, .. } => match slot {
            None => *slot = Some(Value::Hash(fields.into_iter().collect())),
            Some(Value::Hash(map)) => map.extend(fields),
            Some(_) => return Err(wrong_type(key, "hash")),
        },
        Mutation::HashDelete { field, .. } => match slot {
            None => {}
            Some(Value::Hash(map)) => {
                map.remove(&field);
                if map.is_empty() {
                    *slot = None;
                }
            }
            Some(_) => return Err(wrong_type(key, "hash")),
        },
        Mutation::Delete { .. } => *slot = None,
    }
    Ok(())
}

/// In-memory key-value store.
///
/// Behaves like the Redis backend, including watch semantics: every write
/// stamps the key with a fresh [`Version`], and a watch session commits only if
/// the versions it recorded are still current. Used by tests and by the API
/// server when no Redis URL is configured.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys currently holding a value.
    pub async fn key_count(&self) -> usize {
        self.inner.read().await.data.len()
    }

    /// Returns the version of a key (initial if it was never written).
    pub async fn version(&self, key: &str) -> Version {
        self.inner.read().await.version_of(key)
    }

    /// Removes every key.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        let keys: Vec<String> = inner.data.keys().cloned().collect();
        inner.data.clear();
        for key in keys {
            inner.touch(&key);
        }
    }

    /// Makes every subsequent operation fail with [`StoreError::Unavailable`]
    /// until switched back.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.inner.write().await.unavailable = unavailable;
    }

    /// Makes the next `count` watch commits report a conflict, as if another
    /// client had written a watched key just before each of them.
    pub async fn inject_conflicts(&self, count: usize) {
        self.inner.write().await.injected_conflicts = count;
    }
}

#[async_trait]
impl KvStore for InMemoryStore {
    type Guard = InMemoryWatch;

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.read().await;
        inner.ensure_available()?;
        inner.get_str(key)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_available()?;
        inner.apply_all(vec![Mutation::Set {
            key: key.to_string(),
            value: value.to_string(),
        }])
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut inner = self.inner.write().await;
        inner.ensure_available()?;
        inner.apply_all(vec![Mutation::IncrBy {
            key: key.to_string(),
            delta,
        }])?;
        parse_counter(key, inner.get_str(key)?)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        inner.ensure_available()?;
        let existed = inner.data.contains_key(key);
        inner.apply_all(vec![Mutation::Delete {
            key: key.to_string(),
        }])?;
        Ok(existed)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        inner.ensure_available()?;
        if inner.set_contains(key, member)? {
            return Ok(false);
        }
        inner.apply_all(vec![Mutation::SetAdd {
            key: key.to_string(),
            member: member.to_string(),
        }])?;
        Ok(true)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        inner.ensure_available()?;
        inner.set_contains(key, member)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        inner.ensure_available()?;
        match inner.data.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key, "set")),
        }
    }

    async fn set_len(&self, key: &str) -> Result<usize> {
        let inner = self.inner.read().await;
        inner.ensure_available()?;
        inner.set_len(key)
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<usize> {
        let mut inner = self.inner.write().await;
        inner.ensure_available()?;
        inner.apply_all(vec![Mutation::ListPush {
            key: key.to_string(),
            value: value.to_string(),
        }])?;
        match inner.data.get(key) {
            Some(Value::List(items)) => Ok(items.len()),
            _ => Err(wrong_type(key, "list")),
        }
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        inner.ensure_available()?;
        match inner.data.get(key) {
            None => Ok(Vec::new()),
            Some(Value::List(items)) => Ok(items.clone()),
            Some(_) => Err(wrong_type(key, "list")),
        }
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.ensure_available()?;
        inner.apply_all(vec![Mutation::HashSet {
            key: key.to_string(),
            fields: fields.to_vec(),
        }])
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        inner.ensure_available()?;
        let existed = match inner.data.get(key) {
            None => false,
            Some(Value::Hash(map)) => map.contains_key(field),
            Some(_) => return Err(wrong_type(key, "hash")),
        };
        if existed {
            inner.apply_all(vec![Mutation::HashDelete {
                key: key.to_string(),
                field: field.to_string(),
            }])?;
        }
        Ok(existed)
    }

    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>> {
        let inner = self.inner.read().await;
        inner.ensure_available()?;
        match inner.data.get(key) {
            None => Ok(BTreeMap::new()),
            Some(Value::Hash(map)) => Ok(map.clone()),
            Some(_) => Err(wrong_type(key, "hash")),
        }
    }

    async fn watch(&self, keys: &[String]) -> Result<InMemoryWatch> {
        let inner = self.inner.read().await;
        inner.ensure_available()?;
        let seen = keys.iter().map(|key| inner.version_of(key)).collect();
        Ok(InMemoryWatch {
            inner: Arc::clone(&self.inner),
            keys: keys.to_vec(),
            seen,
        })
    }
}

/// Watch session over an [`InMemoryStore`].
pub struct InMemoryWatch {
    inner: Arc<RwLock<Inner>>,
    keys: Vec<String>,
    seen: Vec<Version>,
}

#[async_trait]
impl WatchGuard for InMemoryWatch {
    fn keys(&self) -> &[String] {
        &self.keys
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.read().await;
        inner.ensure_available()?;
        inner.get_str(key)
    }

    async fn set_contains(&mut self, key: &str, member: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        inner.ensure_available()?;
        inner.set_contains(key, member)
    }

    async fn set_len(&mut self, key: &str) -> Result<usize> {
        let inner = self.inner.read().await;
        inner.ensure_available()?;
        inner.set_len(key)
    }

    async fn exec(self, txn: Transaction) -> Result<CommitOutcome> {
        let mut inner = self.inner.write().await;
        inner.ensure_available()?;

        if inner.injected_conflicts > 0 {
            inner.injected_conflicts -= 1;
            return Ok(CommitOutcome::Conflict);
        }

        let changed = self
            .keys
            .iter()
            .zip(&self.seen)
            .any(|(key, seen)| inner.version_of(key) != *seen);
        if changed {
            return Ok(CommitOutcome::Conflict);
        }

        inner.apply_all(txn.into_mutations())?;
        Ok(CommitOutcome::Committed)
    }

    async fn unwatch(self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KvStoreExt;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|k| k.to_string()).collect()
    }

    #[tokio::test]
    async fn counters_start_at_zero() {
        let store = InMemoryStore::new();
        assert_eq!(store.get_counter("stock:1").await.unwrap(), 0);
        assert_eq!(store.incr_by("stock:1", 5).await.unwrap(), 5);
        assert_eq!(store.incr_by("stock:1", -2).await.unwrap(), 3);
        assert_eq!(store.get("stock:1").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn incr_on_non_integer_fails_without_writing() {
        let store = InMemoryStore::new();
        store.set("stock:1", "lots").await.unwrap();
        let before = store.version("stock:1").await;

        let result = store.incr_by("stock:1", 1).await;
        assert!(matches!(result, Err(StoreError::NotAnInteger { .. })));
        assert_eq!(store.version("stock:1").await, before);
    }

    #[tokio::test]
    async fn sets_lists_and_hashes() {
        let store = InMemoryStore::new();
        assert!(store.set_add("users", "u1").await.unwrap());
        assert!(!store.set_add("users", "u1").await.unwrap());
        assert!(store.set_contains("users", "u1").await.unwrap());
        assert_eq!(store.set_members("users").await.unwrap(), vec!["u1"]);

        assert_eq!(store.list_push("orders", "a").await.unwrap(), 1);
        assert_eq!(store.list_push("orders", "b").await.unwrap(), 2);
        assert_eq!(store.list_range("orders").await.unwrap(), vec!["a", "b"]);

        store
            .hash_set("product:1", &[("price".into(), "100".into())])
            .await
            .unwrap();
        let product = store.hash_get_all("product:1").await.unwrap();
        assert_eq!(product.get("price").map(String::as_str), Some("100"));

        assert!(store.hash_delete("product:1", "price").await.unwrap());
        assert!(!store.hash_delete("product:1", "price").await.unwrap());
        assert_eq!(store.key_count().await, 2);
        assert_eq!(store.set_len("users").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn wrong_type_is_reported() {
        let store = InMemoryStore::new();
        store.list_push("orders", "a").await.unwrap();
        let result = store.get("orders").await;
        assert!(matches!(result, Err(StoreError::WrongType { .. })));
    }

    #[tokio::test]
    async fn exec_commits_when_watched_keys_unchanged() {
        let store = InMemoryStore::new();
        store.set("stock:1", "2").await.unwrap();

        let mut guard = store.watch(&keys(&["stock:1"])).await.unwrap();
        assert_eq!(guard.get("stock:1").await.unwrap().as_deref(), Some("2"));

        let mut txn = Transaction::new();
        txn.decr_by("stock:1", 2).list_push("user:u1:orders", "o1");
        let outcome = guard.exec(txn).await.unwrap();

        assert_eq!(outcome, CommitOutcome::Committed);
        assert_eq!(store.get_counter("stock:1").await.unwrap(), 0);
        assert_eq!(
            store.list_range("user:u1:orders").await.unwrap(),
            vec!["o1"]
        );
    }

    #[tokio::test]
    async fn exec_conflicts_when_watched_key_written() {
        let store = InMemoryStore::new();
        store.set("stock:1", "2").await.unwrap();

        let guard = store.watch(&keys(&["stock:1"])).await.unwrap();
        store.set("stock:1", "5").await.unwrap();

        let mut txn = Transaction::new();
        txn.decr_by("stock:1", 1);
        let outcome = guard.exec(txn).await.unwrap();

        assert_eq!(outcome, CommitOutcome::Conflict);
        assert_eq!(store.get_counter("stock:1").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn rewriting_the_same_value_still_conflicts() {
        let store = InMemoryStore::new();
        store.set("stock:1", "2").await.unwrap();

        let guard = store.watch(&keys(&["stock:1"])).await.unwrap();
        store.set("stock:1", "2").await.unwrap();

        let outcome = guard.exec(Transaction::new()).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Conflict);
    }

    #[tokio::test]
    async fn watching_a_missing_key_detects_its_creation() {
        let store = InMemoryStore::new();
        let guard = store.watch(&keys(&["seckill:users:e1"])).await.unwrap();
        store.set_add("seckill:users:e1", "u9").await.unwrap();

        let outcome = guard.exec(Transaction::new()).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Conflict);
    }

    #[tokio::test]
    async fn unwatched_writes_do_not_conflict() {
        let store = InMemoryStore::new();
        let guard = store.watch(&keys(&["stock:1"])).await.unwrap();
        store.set("stock:2", "9").await.unwrap();

        let outcome = guard.exec(Transaction::new()).await.unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);
    }

    #[tokio::test]
    async fn failing_mutation_leaves_store_untouched() {
        let store = InMemoryStore::new();
        store.set("stock:1", "3").await.unwrap();
        store.list_push("cart:u1", "x").await.unwrap();

        let guard = store.watch(&keys(&["stock:1"])).await.unwrap();
        let mut txn = Transaction::new();
        txn.decr_by("stock:1", 1).set_add("cart:u1", "oops");
        let result = guard.exec(txn).await;

        assert!(matches!(result, Err(StoreError::WrongType { .. })));
        assert_eq!(store.get_counter("stock:1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn delete_then_recreate_in_one_transaction() {
        let store = InMemoryStore::new();
        store.set("k", "text").await.unwrap();

        let guard = store.watch(&keys(&["k"])).await.unwrap();
        let mut txn = Transaction::new();
        txn.delete("k").set_add("k", "member");
        guard.exec(txn).await.unwrap();

        assert!(store.set_contains("k", "member").await.unwrap());
    }

    #[tokio::test]
    async fn injected_conflicts_are_consumed() {
        let store = InMemoryStore::new();
        store.inject_conflicts(1).await;

        let first = store.watch(&keys(&["a"])).await.unwrap();
        assert_eq!(
            first.exec(Transaction::new()).await.unwrap(),
            CommitOutcome::Conflict
        );

        let second = store.watch(&keys(&["a"])).await.unwrap();
        assert_eq!(
            second.exec(Transaction::new()).await.unwrap(),
            CommitOutcome::Committed
        );
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryStore::new();
        store.set_unavailable(true).await;
        assert!(matches!(
            store.get("k").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.watch(&keys(&["k"])).await,
            Err(StoreError::Unavailable(_))
        ));

        store.set_unavailable(false).await;
        assert!(store.get("k").await.is_ok());
    }

    #[tokio::test]
    async fn clear_invalidates_watches() {
        let store = InMemoryStore::new();
        store.set("k", "1").await.unwrap();
        let guard = store.watch(&keys(&["k"])).await.unwrap();

        store.clear().await;
        assert_eq!(store.key_count().await, 0);
        assert_eq!(
            guard.exec(Transaction::new()).await.unwrap(),
            CommitOutcome::Conflict
        );
    }
}
