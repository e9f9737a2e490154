//! Records stored by the engine and their field-level encodings.

mod money;
mod order;
mod sale;

pub use money::Money;
pub use order::{AdmissionOrder, Order, OrderIdGenerator, OrderStatus};
pub use sale::{FlashSaleConfig, SaleWindow};

use std::collections::BTreeMap;

use crate::error::{EngineError, Result};

/// Returns a required field of a stored hash.
pub(crate) fn required<'a>(
    key: &str,
    fields: &'a BTreeMap<String, String>,
    field: &str,
) -> Result<&'a str> {
    fields
        .get(field)
        .map(String::as_str)
        .ok_or_else(|| EngineError::corrupt(key, format!("missing field `{field}`")))
}
