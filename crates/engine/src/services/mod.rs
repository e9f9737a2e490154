//! Collaborators the engine talks to outside the ledgers.
//!
//! Each one is a trait with a store-backed implementation; the notifier also
//! has an in-memory implementation for tests.

pub mod catalog;
pub mod event_config;
pub mod notifier;
pub mod work_queue;

pub use catalog::{Catalog, StoreCatalog};
pub use event_config::{EventConfigSource, StoreEventConfig};
pub use notifier::{InMemoryNotifier, Notice, NoticeKind, Notifier, StoreNotifier};
pub use work_queue::{StoreWorkQueue, WorkQueue};
