use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason an identifier was rejected at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The identifier was empty or only whitespace.
    #[error("{kind} must not be empty")]
    Empty { kind: &'static str },

    /// The identifier contains a character reserved by the key schema.
    #[error("{kind} `{value}` contains reserved character ':' or whitespace")]
    Reserved { kind: &'static str, value: String },
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parses an identifier, rejecting empty values and characters that
            /// would break store key composition.
            pub fn parse(value: impl Into<String>) -> Result<Self, IdError> {
                let value = value.into();
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(IdError::Empty { kind: $kind });
                }
                if trimmed.contains(':') || trimmed.contains(char::is_whitespace) {
                    return Err(IdError::Reserved {
                        kind: $kind,
                        value,
                    });
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = IdError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Catalog item identifier (product id / SKU).
    ItemId,
    "item id"
);

string_id!(
    /// Flash-sale event identifier.
    SaleEventId,
    "event id"
);

string_id!(
    /// Identifier of a shopper, used both as buyer and as flash-sale participant.
    UserId,
    "user id"
);

string_id!(
    /// Order identifier. Generated from the creation timestamp by the engine.
    OrderId,
    "order id"
);
