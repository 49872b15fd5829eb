//! Connection handle type.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Global counter for connection handle generation.
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier of one transport connection.
///
/// Handles come from an atomic counter, so a handle is never reused within a
/// process lifetime even after its connection closes. Displayed as
/// `conn-XXXXXXXX` (hexadecimal); that string doubles as the placeholder
/// identifier of a session that has not registered yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionHandle(u64);

impl ConnectionHandle {
    /// Allocate a new unique handle.
    pub fn next() -> Self {
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u64 value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Create a handle from a raw value.
    ///
    /// Used by tests and by callers that received a handle over the wire.
    pub fn from_raw(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{:08x}", self.0)
    }
}

impl FromStr for ConnectionHandle {
    type Err = crate::error::HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("conn-")
            .and_then(|hex| u64::from_str_radix(hex, 16).ok())
            .map(ConnectionHandle)
            .ok_or_else(|| crate::error::HubError::SessionNotFound(s.into()))
    }
}
