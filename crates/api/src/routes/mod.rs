//! HTTP route handlers.

pub mod carts;
pub mod flash_sales;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;
pub mod stock;

use engine::Storefront;
use kv_store::KvStore;

/// Shared application state accessible from all handlers.
pub struct AppState<S: KvStore> {
    pub storefront: Storefront<S>,
    pub store: S,
}
