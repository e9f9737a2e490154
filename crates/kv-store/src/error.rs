use thiserror::Error;

/// Errors that can occur when talking to the key-value store.
///
/// A watch conflict is not an error: it is reported as
/// [`CommitOutcome::Conflict`](crate::CommitOutcome::Conflict).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or refused the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A Redis command failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A key holds a value of a different kind than the operation expects.
    #[error("Wrong kind of value at key {key}: expected {expected}")]
    WrongType { key: String, expected: &'static str },

    /// A counter operation hit a value that is not an integer.
    #[error("Value at key {key} is not an integer: {value}")]
    NotAnInteger { key: String, value: String },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
