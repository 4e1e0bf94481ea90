//! Typed identifiers used throughout the crate.
//!
//! Wrapping raw strings in dedicated types keeps device ids, async
//! correlation ids and credentials from being swapped at call sites.
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`DeviceId`] | Device endpoint name (`ep` on the wire) |
//! | [`AsyncId`] | Correlation id for async device requests |
//! | [`ApiKey`] | Access key for REST calls and socket handshakes |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// DeviceId
// ============================================================================

/// Device endpoint identifier.
///
/// Matches the `ep` field of inbound notification items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a device id from a raw endpoint name.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw endpoint name.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// AsyncId
// ============================================================================

/// Correlation identifier for asynchronous device requests.
///
/// Sent as the `async-id` query parameter of a device request and echoed
/// back as the `id` field of the matching async-response item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AsyncId(String);

impl AsyncId {
    /// Creates an async id from a raw string.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh client-side correlation id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AsyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AsyncId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AsyncId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// ApiKey
// ============================================================================

/// Access key used for control-plane calls and socket handshakes.
///
/// The service accepts the key in two forms: as a `Bearer` authorization
/// header on REST calls, and as a vendor-prefixed WebSocket sub-protocol
/// token on streaming handshakes. Both renderings live here so the
/// `pelion_` prefix stays in exactly one place.
///
/// `Debug` output redacts the key body.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Creates an api key from its raw form.
    #[inline]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the raw key.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Renders the key as the streaming sub-protocol token.
    ///
    /// The service authenticates WebSocket handshakes through the
    /// `Sec-WebSocket-Protocol` header, not an authorization header, and
    /// requires this exact `pelion_<key>` form.
    #[must_use]
    pub fn subprotocol(&self) -> String {
        format!("pelion_{}", self.0)
    }

    /// Renders the key as an `Authorization` header value.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown: String = self.0.chars().take(6).collect();
        write!(f, "ApiKey({shown}***)")
    }
}

impl From<&str> for ApiKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ApiKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

// ============================================================================
// Tests
// ============================================================================
