//! Inventory-consistent transaction engine for a storefront.
//!
//! This crate provides:
//! - [`Coordinator`]: optimistic watch / validate / mutate / commit cycles
//!   with per-call conflict policies
//! - [`AdmissionControl`]: flash-sale admission that never over-allocates a
//!   quota or admits a participant twice
//! - [`Checkout`]: all-or-nothing multi-item checkout
//! - [`StockAdmin`] and [`FlashSaleAdmin`] for administrative adjustments
//! - Collaborator traits ([`services`]) with store-backed implementations

pub mod admission;
pub mod cart;
pub mod checkout;
pub mod clock;
pub mod coordinator;
pub mod error;
pub mod flash_sale;
pub mod keys;
pub mod orders;
pub mod records;
pub mod services;
pub mod stock;
pub mod storefront;

pub use admission::{AdmissionControl, AdmissionOutcome};
pub use cart::{CartSnapshot, CartStore, parse_quantity};
pub use checkout::{Checkout, CheckoutOutcome, Shortage};
pub use clock::{Clock, FixedClock, SystemClock};
pub use coordinator::{
    ConflictPolicy, Coordinator, Decision, RetryPolicy, Snapshot, TxnOutcome, WatchSet,
};
pub use error::{EngineError, Result};
pub use flash_sale::{FlashSaleAdmin, FlashSaleStatus, QuotaResize};
pub use orders::OrderBook;
pub use records::{
    AdmissionOrder, FlashSaleConfig, Money, Order, OrderIdGenerator, OrderStatus, SaleWindow,
};
pub use stock::{StockAdmin, StockLevel};
pub use storefront::{StoreAdmission, StoreCheckout, Storefront};
