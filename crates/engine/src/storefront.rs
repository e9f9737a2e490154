//! All engine components wired to a single store.

use std::sync::Arc;

use kv_store::KvStore;

use crate::admission::AdmissionControl;
use crate::cart::CartStore;
use crate::checkout::Checkout;
use crate::clock::Clock;
use crate::coordinator::ConflictPolicy;
use crate::flash_sale::FlashSaleAdmin;
use crate::orders::OrderBook;
use crate::services::{StoreCatalog, StoreEventConfig, StoreNotifier, StoreWorkQueue};
use crate::stock::StockAdmin;

/// Admission control with store-backed collaborators.
pub type StoreAdmission<S> = AdmissionControl<S, StoreEventConfig<S>, StoreNotifier<S>>;

/// Checkout with store-backed collaborators.
pub type StoreCheckout<S> = Checkout<S, StoreCatalog<S>, StoreWorkQueue<S>, StoreNotifier<S>>;

/// Every component of the engine, sharing one store.
pub struct Storefront<S: KvStore> {
    pub admission: StoreAdmission<S>,
    pub checkout: StoreCheckout<S>,
    pub flash_sales: FlashSaleAdmin<S>,
    pub stock: StockAdmin<S>,
    pub carts: CartStore<S>,
    pub catalog: StoreCatalog<S>,
    pub orders: OrderBook<S>,
    pub queue: StoreWorkQueue<S>,
    pub notices: StoreNotifier<S>,
}

impl<S: KvStore + Clone> Storefront<S> {
    pub fn new(store: S) -> Self {
        Self {
            admission: AdmissionControl::new(
                store.clone(),
                StoreEventConfig::new(store.clone()),
                StoreNotifier::new(store.clone()),
            ),
            checkout: Checkout::new(
                store.clone(),
                StoreCatalog::new(store.clone()),
                StoreWorkQueue::new(store.clone()),
                StoreNotifier::new(store.clone()),
            ),
            flash_sales: FlashSaleAdmin::new(store.clone()),
            stock: StockAdmin::new(store.clone()),
            carts: CartStore::new(store.clone()),
            catalog: StoreCatalog::new(store.clone()),
            orders: OrderBook::new(store.clone()),
            queue: StoreWorkQueue::new(store.clone()),
            notices: StoreNotifier::new(store),
        }
    }

    /// Sets the conflict policy of admission control.
    #[must_use]
    pub fn with_admission_policy(mut self, policy: ConflictPolicy) -> Self {
        self.admission = self.admission.with_policy(policy);
        self
    }

    /// Sets the time source of every time-dependent component.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.admission = self.admission.with_clock(Arc::clone(&clock));
        self.checkout = self.checkout.with_clock(Arc::clone(&clock));
        self.flash_sales = self.flash_sales.with_clock(clock);
        self
    }
}
