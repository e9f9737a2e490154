use std::collections::BTreeMap;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, Client};

use crate::{
    CommitOutcome, Mutation, Result, StoreError, Transaction,
    store::{KvStore, WatchGuard},
};

/// Redis-backed key-value store.
///
/// Plain commands share one auto-reconnecting [`ConnectionManager`]. WATCH is
/// connection-scoped in Redis, so every watch session opens its own connection
/// and keeps it until `exec` or `unwatch`.
///
/// MULTI/EXEC does not roll back a command that fails at run time, such as
/// an RPUSH onto a key holding a string: the other queued commands still
/// apply. `exec` therefore checks the kind of every written key before
/// sending the batch and fails with [`StoreError::WrongType`] or
/// [`StoreError::NotAnInteger`] without writing anything. A key outside the
/// watch set that changes kind between that check and EXEC can still leave
/// a partial batch behind.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connects to Redis at `url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client.clone()).await?;
        tracing::info!(%url, "connected to redis");
        Ok(Self { client, manager })
    }

    /// Removes every key of the selected database.
    pub async fn flush_db(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for RedisStore {
    type Guard = RedisWatch;

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.manager.clone();
        Ok(conn.incr(key, delta).await?)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let removed: usize = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let added: usize = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        Ok(conn.sismember(key, member).await?)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        let mut members: Vec<String> = conn.smembers(key).await?;
        members.sort();
        Ok(members)
    }

    async fn set_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.manager.clone();
        Ok(conn.scard(key).await?)
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<usize> {
        let mut conn = self.manager.clone();
        Ok(conn.rpush(key, value).await?)
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        Ok(conn.lrange(key, 0, -1).await?)
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        let _: () = conn.hset_multiple(key, fields).await?;
        Ok(())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let removed: usize = conn.hdel(key, field).await?;
        Ok(removed > 0)
    }

    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>> {
        let mut conn = self.manager.clone();
        Ok(conn.hgetall(key).await?)
    }

    async fn watch(&self, keys: &[String]) -> Result<RedisWatch> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        if !keys.is_empty() {
            let _: () = redis::cmd("WATCH").arg(keys).query_async(&mut conn).await?;
        }
        Ok(RedisWatch {
            conn,
            keys: keys.to_vec(),
        })
    }
}

/// Watch session holding a dedicated Redis connection.
pub struct RedisWatch {
    conn: MultiplexedConnection,
    keys: Vec<String>,
}

/// What a key holds at some point of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Missing,
    Counter,
    Text(String),
    Set,
    List,
    Hash,
    Other,
}

impl Kind {
    fn of_string(value: String) -> Self {
        if value.parse::<i64>().is_ok() {
            Kind::Counter
        } else {
            Kind::Text(value)
        }
    }
}

impl RedisWatch {
    async fn kind_of(&mut self, key: &str) -> Result<Kind> {
        let name: String = redis::cmd("TYPE").arg(key).query_async(&mut self.conn).await?;
        Ok(match name.as_str() {
            "none" => Kind::Missing,
            "set" => Kind::Set,
            "list" => Kind::List,
            "hash" => Kind::Hash,
            "string" => {
                let value: Option<String> = self.conn.get(key).await?;
                value.map_or(Kind::Missing, Kind::of_string)
            }
            _ => Kind::Other,
        })
    }

    /// Replays the batch against the current key kinds and fails on the first
    /// command Redis would reject.
    async fn check_kinds(&mut self, mutations: &[Mutation]) -> Result<()> {
        let mut kinds: BTreeMap<&str, Kind> = BTreeMap::new();
        for mutation in mutations {
            let key = mutation.key();
            let current = match kinds.remove(key) {
                Some(kind) => kind,
                None => self.kind_of(key).await?,
            };
            let next = match (mutation, current) {
                (Mutation::Set { value, .. }, _) => Kind::of_string(value.clone()),
                (Mutation::Delete { .. }, _) => Kind::Missing,
                (Mutation::IncrBy { .. }, Kind::Missing | Kind::Counter) => Kind::Counter,
                (Mutation::IncrBy { .. }, Kind::Text(value)) => {
                    return Err(StoreError::NotAnInteger {
                        key: key.to_string(),
                        value,
                    });
                }
                (Mutation::SetAdd { .. }, Kind::Missing | Kind::Set) => Kind::Set,
                (Mutation::ListPush { .. }, Kind::Missing | Kind::List) => Kind::List,
                (Mutation::HashSet { fields, .. }, Kind::Missing) if fields.is_empty() => {
                    Kind::Missing
                }
                (Mutation::HashSet { .. }, Kind::Missing | Kind::Hash) => Kind::Hash,
                (Mutation::HashDelete { .. }, kind @ (Kind::Missing | Kind::Hash)) => kind,
                (mutation, _) => return Err(wrong_type(mutation)),
            };
            kinds.insert(key, next);
        }
        Ok(())
    }
}

fn wrong_type(mutation: &Mutation) -> StoreError {
    let expected = match mutation {
        Mutation::IncrBy { .. } | Mutation::Set { .. } | Mutation::Delete { .. } => "string",
        Mutation::SetAdd { .. } => "set",
        Mutation::ListPush { .. } => "list",
        Mutation::HashSet { .. } | Mutation::HashDelete { .. } => "hash",
    };
    StoreError::WrongType {
        key: mutation.key().to_string(),
        expected,
    }
}

#[async_trait]
impl WatchGuard for RedisWatch {
    fn keys(&self) -> &[String] {
        &self.keys
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.conn.get(key).await?)
    }

    async fn set_contains(&mut self, key: &str, member: &str) -> Result<bool> {
        Ok(self.conn.sismember(key, member).await?)
    }

    async fn set_len(&mut self, key: &str) -> Result<usize> {
        Ok(self.conn.scard(key).await?)
    }

    async fn exec(mut self, txn: Transaction) -> Result<CommitOutcome> {
        self.check_kinds(txn.mutations()).await?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for mutation in txn.into_mutations() {
            match mutation {
                Mutation::Set { key, value } => {
                    pipe.set(key, value).ignore();
                }
                Mutation::IncrBy { key, delta } => {
                    pipe.incr(key, delta).ignore();
                }
                Mutation::SetAdd { key, member } => {
                    pipe.sadd(key, member).ignore();
                }
                Mutation::ListPush { key, value } => {
                    pipe.rpush(key, value).ignore();
                }
                Mutation::HashSet { key, fields } => {
                    if !fields.is_empty() {
                        pipe.hset_multiple(key, fields.as_slice()).ignore();
                    }
                }
                Mutation::HashDelete { key, field } => {
                    pipe.hdel(key, field).ignore();
                }
                Mutation::Delete { key } => {
                    pipe.del(key).ignore();
                }
            }
        }

        // EXEC replies nil when a watched key was touched.
        let reply: Option<redis::Value> = pipe.query_async(&mut self.conn).await?;
        Ok(match reply {
            Some(_) => CommitOutcome::Committed,
            None => CommitOutcome::Conflict,
        })
    }

    async fn unwatch(mut self) -> Result<()> {
        let _: () = redis::cmd("UNWATCH").query_async(&mut self.conn).await?;
        Ok(())
    }
}
