//! Engine error types.

use common::{IdError, ItemId, SaleEventId};
use kv_store::StoreError;
use thiserror::Error;

/// Errors that can occur during engine operations.
///
/// Business outcomes such as an exhausted quota or a stock shortage are not
/// errors; they are reported through the outcome enums of each operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed caller input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An identifier failed to parse.
    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// A quantity was zero, negative or not a number.
    #[error("Invalid quantity for item {item}: {reason}")]
    InvalidQuantity { item: String, reason: String },

    /// No configuration exists for the flash-sale event.
    #[error("Unknown flash-sale event: {0}")]
    UnknownEvent(SaleEventId),

    /// The catalog has no price for the item.
    #[error("Unknown catalog item: {0}")]
    UnknownItem(ItemId),

    /// The key-value store failed or could not be reached.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(StoreError),

    /// A stored record does not have the expected shape.
    #[error("Corrupt record at {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub(crate) fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::CorruptRecord {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the error was caused by the caller's input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::Validation(_)
                | EngineError::InvalidId(_)
                | EngineError::InvalidQuantity { .. }
        )
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::WrongType { key, expected } => EngineError::CorruptRecord {
                key,
                reason: format!("expected a {expected}"),
            },
            StoreError::NotAnInteger { key, value } => EngineError::CorruptRecord {
                key,
                reason: format!("`{value}` is not an integer"),
            },
            other => EngineError::StoreUnavailable(other),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
