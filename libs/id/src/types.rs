//! Typed ID definitions for console resources.

use crate::define_id;

// =============================================================================
// Care Model
// =============================================================================

define_id!(PatientId, "patient");
define_id!(BedId, "bed");
define_id!(WardId, "ward");

// =============================================================================
// Alerts
// =============================================================================

/// Alert ID is a backend-assigned integer, not a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AlertId(i64);

impl AlertId {
    /// Creates a new AlertId from an i64.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the underlying i64 value.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AlertId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl serde::Serialize for AlertId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for AlertId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id = i64::deserialize(deserializer)?;
        Ok(Self(id))
    }
}

// =============================================================================
// Tests
// =============================================================================
