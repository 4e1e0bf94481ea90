//! Classified notification events.
//!
//! [`classify`] turns one decoded [`NotificationEnvelope`] into typed,
//! timestamped events. Classification stamps every item with a reception
//! time (the service does not send one), normalizes the two
//! de-registration shapes, and never suspends or touches the network.
//!
//! # Event Kinds
//!
//! | Kind | Event type | Identity |
//! |------|-----------|----------|
//! | Registration, RegistrationUpdate | [`RegistrationEvent`] | device id |
//! | Deregistration, RegistrationExpired | [`DeviceEvent`] | device id |
//! | Notification | [`ResourceNotification`] | device id + resource path |
//! | AsyncResponse | [`AsyncResponse`] | async id |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::identifiers::{AsyncId, DeviceId};

use super::envelope::{
    AsyncResponseItem, DeviceRef, NotificationEnvelope, NotificationItem, RegistrationItem,
    ResourceInfo,
};

// ============================================================================
// EventKind
// ============================================================================

/// The category an inbound item was classified under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Device registered.
    Registration,
    /// Device renewed its registration.
    RegistrationUpdate,
    /// Device deregistered cleanly.
    Deregistration,
    /// Device registration lease lapsed.
    RegistrationExpired,
    /// Resource value notification.
    Notification,
    /// Response to an asynchronous device request.
    AsyncResponse,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Wire category names.
        let name = match self {
            Self::Registration => "registrations",
            Self::RegistrationUpdate => "reg-updates",
            Self::Deregistration => "de-registrations",
            Self::RegistrationExpired => "registrations-expired",
            Self::Notification => "notifications",
            Self::AsyncResponse => "async-responses",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Payload
// ============================================================================

/// A base64 transport-encoded value.
///
/// Notification and async-response payloads travel as base64 text; this
/// wrapper keeps the transport form and decodes on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Payload(String);

impl Payload {
    /// Wraps an already-encoded transport value.
    #[inline]
    pub fn from_base64(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Encodes raw bytes into transport form.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(BASE64.encode(bytes))
    }

    /// Encodes text into transport form.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        Self::from_bytes(text.as_bytes())
    }

    /// Returns the transport (base64) form.
    #[inline]
    #[must_use]
    pub fn as_base64(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the transport form is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decodes the payload into raw bytes.
    ///
    /// # Errors
    ///
    /// [`Error::PayloadDecode`] if the transport form is not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.0)
            .map_err(|err| Error::payload_decode(format!("invalid base64: {err}")))
    }

    /// Decodes the payload into UTF-8 text.
    ///
    /// # Errors
    ///
    /// [`Error::PayloadDecode`] if the transport form is not valid base64
    /// or the decoded bytes are not valid UTF-8.
    pub fn decode_utf8(&self) -> Result<String> {
        String::from_utf8(self.decode()?)
            .map_err(|_| Error::payload_decode("payload is not valid UTF-8"))
    }

    /// Returns `true` if the decoded payload equals `expected` as text.
    ///
    /// A payload that fails to decode matches nothing.
    #[must_use]
    pub fn matches_text(&self, expected: &str) -> bool {
        self.decode_utf8().is_ok_and(|text| text == expected)
    }
}

// ============================================================================
// Event Types
// ============================================================================

/// A classified registration or registration-update.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationEvent {
    /// Device endpoint name.
    pub device_id: DeviceId,
    /// Endpoint type, when advertised.
    pub endpoint_type: Option<String>,
    /// Endpoint name before aliasing, when sent.
    pub original_ep: Option<String>,
    /// Resources advertised at registration.
    pub resources: Vec<ResourceInfo>,
    /// Reception time, assigned at classification.
    pub received_at: DateTime<Utc>,
}

impl RegistrationEvent {
    fn from_item(item: RegistrationItem, received_at: DateTime<Utc>) -> Self {
        Self {
            device_id: DeviceId::new(item.ep),
            endpoint_type: item.ept,
            original_ep: item.original_ep,
            resources: item.resources,
            received_at,
        }
    }
}

/// A classified de-registration or registration-expiration.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceEvent {
    /// Device endpoint name.
    pub device_id: DeviceId,
    /// Reception time, assigned at classification.
    pub received_at: DateTime<Utc>,
}

impl DeviceEvent {
    fn from_ref(device: &DeviceRef, received_at: DateTime<Utc>) -> Self {
        Self {
            device_id: DeviceId::new(device.device_id()),
            received_at,
        }
    }
}

/// A classified resource value notification.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceNotification {
    /// Device endpoint name.
    pub device_id: DeviceId,
    /// Resource path the value belongs to.
    pub resource_path: String,
    /// Resource value in transport form.
    pub payload: Payload,
    /// Content type of the payload.
    pub content_type: Option<String>,
    /// Reception time, assigned at classification.
    pub received_at: DateTime<Utc>,
}

impl ResourceNotification {
    fn from_item(item: NotificationItem, received_at: DateTime<Utc>) -> Self {
        Self {
            device_id: DeviceId::new(item.ep),
            resource_path: item.path,
            payload: Payload::from_base64(item.payload),
            content_type: item.ct,
            received_at,
        }
    }
}

/// A classified response to an asynchronous device request.
#[derive(Debug, Clone, Serialize)]
pub struct AsyncResponse {
    /// Correlation id, echoing the request's async id.
    pub async_id: AsyncId,
    /// Result status of the device operation.
    pub status: Option<u16>,
    /// Response value in transport form, when present.
    pub payload: Option<Payload>,
    /// Error description for failed operations.
    pub error: Option<String>,
    /// Reception time, assigned at classification.
    pub received_at: DateTime<Utc>,
}

impl AsyncResponse {
    fn from_item(item: AsyncResponseItem, received_at: DateTime<Utc>) -> Self {
        Self {
            async_id: AsyncId::new(item.id),
            status: item.status,
            payload: item.payload.map(Payload::from_base64),
            error: item.error,
            received_at,
        }
    }

    /// Returns `true` if the device operation succeeded.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_some_and(|status| (200..300).contains(&status))
    }

    /// Decodes the response payload into UTF-8 text.
    ///
    /// # Errors
    ///
    /// [`Error::PayloadDecode`] if there is no payload or it does not
    /// decode to text.
    pub fn decoded_payload(&self) -> Result<String> {
        self.payload
            .as_ref()
            .ok_or_else(|| Error::payload_decode("async response has no payload"))?
            .decode_utf8()
    }
}

// ============================================================================
// NotificationEvent
// ============================================================================

/// One classified inbound item.
///
/// Immutable after classification; retained for the lifetime of the
/// channel that received it.
#[derive(Debug, Clone, Serialize)]
pub enum NotificationEvent {
    /// Device registered.
    Registration(RegistrationEvent),
    /// Device renewed its registration.
    RegistrationUpdate(RegistrationEvent),
    /// Device deregistered cleanly.
    Deregistration(DeviceEvent),
    /// Device registration lease lapsed.
    RegistrationExpired(DeviceEvent),
    /// Resource value notification.
    Notification(ResourceNotification),
    /// Response to an asynchronous device request.
    AsyncResponse(AsyncResponse),
}

impl NotificationEvent {
    /// Returns the kind this event was classified under.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Registration(_) => EventKind::Registration,
            Self::RegistrationUpdate(_) => EventKind::RegistrationUpdate,
            Self::Deregistration(_) => EventKind::Deregistration,
            Self::RegistrationExpired(_) => EventKind::RegistrationExpired,
            Self::Notification(_) => EventKind::Notification,
            Self::AsyncResponse(_) => EventKind::AsyncResponse,
        }
    }

    /// Returns the device id, absent only for async responses.
    #[inline]
    #[must_use]
    pub fn device_id(&self) -> Option<&DeviceId> {
        match self {
            Self::Registration(event) | Self::RegistrationUpdate(event) => Some(&event.device_id),
            Self::Deregistration(event) | Self::RegistrationExpired(event) => {
                Some(&event.device_id)
            }
            Self::Notification(event) => Some(&event.device_id),
            Self::AsyncResponse(_) => None,
        }
    }

    /// Returns the reception time.
    #[inline]
    #[must_use]
    pub fn received_at(&self) -> DateTime<Utc> {
        match self {
            Self::Registration(event) | Self::RegistrationUpdate(event) => event.received_at,
            Self::Deregistration(event) | Self::RegistrationExpired(event) => event.received_at,
            Self::Notification(event) => event.received_at,
            Self::AsyncResponse(event) => event.received_at,
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Classifies an envelope's items into typed events.
///
/// Every produced event carries `received_at`. Unknown categories are the
/// caller's concern; they stay behind in [`NotificationEnvelope::unknown`].
#[must_use]
pub fn classify(envelope: NotificationEnvelope, received_at: DateTime<Utc>) -> Vec<NotificationEvent> {
    let mut events = Vec::with_capacity(envelope.item_count());

    for item in envelope.registrations {
        events.push(NotificationEvent::Registration(RegistrationEvent::from_item(
            item,
            received_at,
        )));
    }
    for item in envelope.registration_updates {
        events.push(NotificationEvent::RegistrationUpdate(
            RegistrationEvent::from_item(item, received_at),
        ));
    }
    for device in &envelope.deregistrations {
        events.push(NotificationEvent::Deregistration(DeviceEvent::from_ref(
            device,
            received_at,
        )));
    }
    for device in &envelope.registrations_expired {
        events.push(NotificationEvent::RegistrationExpired(DeviceEvent::from_ref(
            device,
            received_at,
        )));
    }
    for item in envelope.notifications {
        events.push(NotificationEvent::Notification(ResourceNotification::from_item(
            item,
            received_at,
        )));
    }
    for item in envelope.async_responses {
        events.push(NotificationEvent::AsyncResponse(AsyncResponse::from_item(
            item,
            received_at,
        )));
    }

    events
}

// ============================================================================
// Tests
// ============================================================================
