//! Inbound notification envelope.
//!
//! The notification service pushes one JSON object per socket frame. The
//! object's top-level keys are category names, each holding a batch of
//! items that arrived since the previous push.
//!
//! # Format
//!
//! ```json
//! {
//!   "registrations": [{ "ep": "device-1", "ept": "default", "resources": [...] }],
//!   "notifications": [{ "ep": "device-1", "path": "/3303/0/5700", "payload": "NDI=" }],
//!   "de-registrations": ["device-2"],
//!   "async-responses": [{ "id": "mbed-async-1", "status": 200, "payload": "ok" }]
//! }
//! ```
//!
//! Every category is optional; an envelope may be entirely empty. Unknown
//! top-level keys are retained for diagnostics and dropped during
//! classification.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

// ============================================================================
// NotificationEnvelope
// ============================================================================

/// One decoded notification push.
///
/// The wire name for the registration-update category is `reg-updates`;
/// the long form `registration-updates` is accepted as an alias.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationEnvelope {
    /// Full registrations.
    #[serde(default)]
    pub registrations: Vec<RegistrationItem>,

    /// Registration renewals.
    #[serde(default, rename = "reg-updates", alias = "registration-updates")]
    pub registration_updates: Vec<RegistrationItem>,

    /// Devices that deregistered cleanly.
    #[serde(default, rename = "de-registrations")]
    pub deregistrations: Vec<DeviceRef>,

    /// Devices whose registration lease lapsed.
    #[serde(default, rename = "registrations-expired")]
    pub registrations_expired: Vec<DeviceRef>,

    /// Resource value notifications.
    #[serde(default)]
    pub notifications: Vec<NotificationItem>,

    /// Responses to asynchronous device requests.
    #[serde(default, rename = "async-responses")]
    pub async_responses: Vec<AsyncResponseItem>,

    /// Top-level keys outside the known category set.
    #[serde(flatten)]
    pub unknown: Map<String, Value>,
}

impl NotificationEnvelope {
    /// Parses an envelope from one socket frame.
    ///
    /// # Errors
    ///
    /// [`Error::Json`](crate::Error::Json) if the frame is not a JSON
    /// object of the expected shape.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Returns `true` if no category carries any item.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.item_count() == 0 && self.unknown.is_empty()
    }

    /// Returns the number of items across the known categories.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.registrations.len()
            + self.registration_updates.len()
            + self.deregistrations.len()
            + self.registrations_expired.len()
            + self.notifications.len()
            + self.async_responses.len()
    }

    /// Returns the unknown top-level category names.
    pub fn unknown_categories(&self) -> impl Iterator<Item = &str> {
        self.unknown.keys().map(String::as_str)
    }
}

// ============================================================================
// RegistrationItem
// ============================================================================

/// One registration or registration-update item.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationItem {
    /// Device endpoint name.
    pub ep: String,

    /// Endpoint name before any alias rewrite.
    #[serde(default, rename = "original-ep")]
    pub original_ep: Option<String>,

    /// Endpoint type.
    #[serde(default)]
    pub ept: Option<String>,

    /// Resources the device exposed at registration.
    #[serde(default)]
    pub resources: Vec<ResourceInfo>,

    /// Server-side timestamp, present with v2 serialization.
    #[serde(default)]
    pub timestamp: Option<String>,

    /// Registration uid, present with v2 serialization.
    #[serde(default)]
    pub uid: Option<String>,
}

/// One resource advertised in a registration item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Resource path (e.g., "/3303/0/5700").
    pub path: String,

    /// Resource type.
    #[serde(default)]
    pub rt: Option<String>,

    /// Content type.
    #[serde(default)]
    pub ct: Option<String>,

    /// Whether the resource is observable.
    #[serde(default)]
    pub obs: Option<bool>,
}

// ============================================================================
// DeviceRef
// ============================================================================

/// A device reference in a de-registration or expiration batch.
///
/// The service sends bare endpoint-name strings by default and `{"ep": ..}`
/// objects when v2 serialization is configured with object-form
/// de-registrations; both shapes must parse.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DeviceRef {
    /// Bare endpoint-name string.
    Id(String),
    /// Object form.
    Object {
        /// Device endpoint name.
        ep: String,
    },
}

impl DeviceRef {
    /// Returns the endpoint name regardless of shape.
    #[inline]
    #[must_use]
    pub fn device_id(&self) -> &str {
        match self {
            Self::Id(id) => id,
            Self::Object { ep } => ep,
        }
    }
}

// ============================================================================
// NotificationItem
// ============================================================================

/// One resource value notification.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationItem {
    /// Device endpoint name.
    pub ep: String,

    /// Resource path the value belongs to.
    pub path: String,

    /// Content type of the payload.
    #[serde(default)]
    pub ct: Option<String>,

    /// Resource value, base64 transport-encoded.
    #[serde(default)]
    pub payload: String,

    /// Cache validity of the value, in seconds.
    #[serde(default, rename = "max-age")]
    pub max_age: Option<u64>,
}

// ============================================================================
// AsyncResponseItem
// ============================================================================

/// One response to an asynchronous device request.
#[derive(Debug, Clone, Deserialize)]
pub struct AsyncResponseItem {
    /// Correlation id, echoing the request's async id.
    pub id: String,

    /// Result status of the device operation.
    #[serde(default)]
    pub status: Option<u16>,

    /// Response value, base64 transport-encoded.
    #[serde(default)]
    pub payload: Option<String>,

    /// Error description for failed operations.
    #[serde(default)]
    pub error: Option<String>,

    /// Content type of the payload.
    #[serde(default)]
    pub ct: Option<String>,

    /// Cache validity of the value, in seconds.
    #[serde(default, rename = "max-age")]
    pub max_age: Option<u64>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_envelope() {
        let text = r#"{
            "registrations": [
                {
                    "ep": "device-1",
                    "ept": "default",
                    "resources": [{ "path": "/3303/0/5700", "obs": true }]
                }
            ],
            "reg-updates": [{ "ep": "device-1" }],
            "de-registrations": ["device-2"],
            "registrations-expired": [{ "ep": "device-3" }],
            "notifications": [
                { "ep": "device-1", "path": "/3303/0/5700", "payload": "NDI=", "ct": "text/plain" }
            ],
            "async-responses": [
                { "id": "mbed-async-1", "status": 200, "payload": "b2s=" }
            ]
        }"#;

        let envelope = NotificationEnvelope::parse(text).expect("parse envelope");
        assert_eq!(envelope.registrations.len(), 1);
        assert_eq!(envelope.registration_updates.len(), 1);
        assert_eq!(envelope.deregistrations.len(), 1);
        assert_eq!(envelope.registrations_expired.len(), 1);
        assert_eq!(envelope.notifications.len(), 1);
        assert_eq!(envelope.async_responses.len(), 1);
        assert_eq!(envelope.item_count(), 6);
        assert!(envelope.unknown.is_empty());

        let registration = &envelope.registrations[0];
        assert_eq!(registration.ep, "device-1");
        assert_eq!(registration.ept.as_deref(), Some("default"));
        assert_eq!(registration.resources[0].path, "/3303/0/5700");
        assert_eq!(registration.resources[0].obs, Some(true));
    }

    #[test]
    fn test_parse_empty_envelope() {
        let envelope = NotificationEnvelope::parse("{}").expect("parse envelope");
        assert!(envelope.is_empty());
        assert_eq!(envelope.item_count(), 0);
    }

    #[test]
    fn test_registration_updates_long_alias() {
        let text = r#"{ "registration-updates": [{ "ep": "device-1" }] }"#;
        let envelope = NotificationEnvelope::parse(text).expect("parse envelope");
        assert_eq!(envelope.registration_updates.len(), 1);
        assert!(envelope.unknown.is_empty());
    }

    #[test]
    fn test_device_ref_both_shapes() {
        let text = r#"{ "de-registrations": ["bare-id", { "ep": "object-id" }] }"#;
        let envelope = NotificationEnvelope::parse(text).expect("parse envelope");
        assert_eq!(envelope.deregistrations[0].device_id(), "bare-id");
        assert_eq!(envelope.deregistrations[1].device_id(), "object-id");
    }

    #[test]
    fn test_unknown_category_captured() {
        let text = r#"{ "firmware-manifests": [{ "id": "m-1" }], "notifications": [] }"#;
        let envelope = NotificationEnvelope::parse(text).expect("parse envelope");
        let unknown: Vec<&str> = envelope.unknown_categories().collect();
        assert_eq!(unknown, vec!["firmware-manifests"]);
        assert!(!envelope.is_empty());
        assert_eq!(envelope.item_count(), 0);
    }

    #[test]
    fn test_notification_item_defaults() {
        let text = r#"{ "notifications": [{ "ep": "device-1", "path": "/1/0/1" }] }"#;
        let envelope = NotificationEnvelope::parse(text).expect("parse envelope");
        let item = &envelope.notifications[0];
        assert_eq!(item.payload, "");
        assert_eq!(item.ct, None);
        assert_eq!(item.max_age, None);
    }

    #[test]
    fn test_malformed_envelope_is_error() {
        assert!(NotificationEnvelope::parse("not json").is_err());
        assert!(NotificationEnvelope::parse(r#"{ "notifications": [{}] }"#).is_err());
    }
}
