use serde::{Deserialize, Serialize};

/// Modification stamp of a single key, used for optimistic concurrency control.
///
/// A key that was never written is at [`Version::initial`]. Every write moves
/// the key to a fresh, strictly larger version, so comparing the version seen
/// at watch time with the one seen at commit time detects any intervening write.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Creates a version from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the version of a key that has never been written.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
