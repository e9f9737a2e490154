//! Identifier types shared by the store, engine and API crates.

pub mod types;

pub use types::{IdError, ItemId, OrderId, SaleEventId, UserId};
