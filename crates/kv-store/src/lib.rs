//! Key-value store abstraction for the storefront transaction engine.
//!
//! The store offers plain reads and writes over strings, sets, lists and hashes,
//! plus an optimistic transaction primitive modelled on Redis WATCH/MULTI/EXEC:
//! a [`WatchGuard`] remembers the versions of its keys, and
//! [`WatchGuard::exec`] applies a staged [`Transaction`] only if none of them
//! changed in the meantime.

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;
pub mod transaction;
pub mod version;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryWatch};
pub use redis_store::{RedisStore, RedisWatch};
pub use store::{KvStore, KvStoreExt, WatchGuard, parse_counter};
pub use transaction::{CommitOutcome, Mutation, Transaction};
pub use version::Version;
