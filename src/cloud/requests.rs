//! Request bodies for the control-plane endpoints.
//!
//! [`DeviceRequest`] is the body of `POST /v2/device-requests/{id}`: a
//! CoAP-style operation relayed to the device, with the payload carried
//! base64-encoded in the `payload-b64` field. The device's answer comes
//! back on the notification channel as an async response carrying the
//! same correlation id, which is what [`send_and_await_response`] ties
//! together.
//!
//! [`PreSubscription`] rules go to `PUT /v2/subscriptions` and take
//! effect for matching devices at their next registration.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::Serialize;
use tracing::debug;

use crate::channel::wait::EventWaiter;
use crate::cloud::client::CloudClient;
use crate::error::Result;
use crate::identifiers::{AsyncId, DeviceId};
use crate::protocol::event::AsyncResponse;

// ============================================================================
// Constants
// ============================================================================

/// Content type assumed for payloads unless overridden.
const DEFAULT_CONTENT_TYPE: &str = "text/plain";

// ============================================================================
// DeviceRequest
// ============================================================================

/// Body of an asynchronous device request.
///
/// Field names and encoding follow the device-requests wire format; the
/// payload travels base64-encoded and is `null` for payload-less
/// methods.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceRequest {
    /// Operation to execute on the device.
    pub method: String,
    /// Resource path, e.g. `/3303/0/5700`.
    pub uri: String,
    /// Base64 of the request payload.
    #[serde(rename = "payload-b64")]
    pub payload_b64: Option<String>,
    /// Content type the requesting client accepts in the response.
    pub accept: String,
    /// Content type of the decoded payload.
    #[serde(rename = "content-type")]
    pub content_type: String,
}

impl DeviceRequest {
    /// Reads a resource value.
    #[must_use]
    pub fn get(uri: impl Into<String>) -> Self {
        Self::payloadless("GET", uri)
    }

    /// Removes a dynamic resource.
    #[must_use]
    pub fn delete(uri: impl Into<String>) -> Self {
        Self::payloadless("DELETE", uri)
    }

    /// Writes a resource value.
    #[must_use]
    pub fn put(uri: impl Into<String>, payload: &str) -> Self {
        Self::with_payload("PUT", uri, payload)
    }

    /// Executes a resource, or creates one when the path is new.
    ///
    /// An empty payload is the usual way to trigger an executable
    /// resource.
    #[must_use]
    pub fn post(uri: impl Into<String>, payload: &str) -> Self {
        Self::with_payload("POST", uri, payload)
    }

    /// Overrides the accepted response content type.
    #[must_use]
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    /// Overrides the payload content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    fn payloadless(method: &str, uri: impl Into<String>) -> Self {
        Self {
            method: method.to_owned(),
            uri: uri.into(),
            payload_b64: None,
            accept: DEFAULT_CONTENT_TYPE.to_owned(),
            content_type: DEFAULT_CONTENT_TYPE.to_owned(),
        }
    }

    fn with_payload(method: &str, uri: impl Into<String>, payload: &str) -> Self {
        let mut request = Self::payloadless(method, uri);
        request.payload_b64 = Some(BASE64.encode(payload.as_bytes()));
        request
    }
}

// ============================================================================
// RequestOptions
// ============================================================================

/// Delivery options of a device request, sent as query parameters.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Delivery attempts before the service gives up.
    pub retry_count: Option<u32>,
    /// Seconds during which delivery is attempted.
    pub expiry_seconds: Option<u64>,
    /// Alternate device addressing, e.g. `endpoint_name`.
    pub device_reference: Option<String>,
}

// ============================================================================
// PreSubscription
// ============================================================================

/// One account-wide subscription rule.
///
/// Absent filters are omitted from the wire form; a rule with only
/// `resource-path` applies to every device.
#[derive(Debug, Clone, Serialize)]
pub struct PreSubscription {
    /// Endpoint name filter, `*` wildcards allowed.
    #[serde(rename = "endpoint-name", skip_serializing_if = "Option::is_none")]
    pub endpoint_name: Option<String>,
    /// Endpoint type filter.
    #[serde(rename = "endpoint-type", skip_serializing_if = "Option::is_none")]
    pub endpoint_type: Option<String>,
    /// Resource paths to subscribe on matching devices.
    #[serde(rename = "resource-path", skip_serializing_if = "Vec::is_empty")]
    pub resource_path: Vec<String>,
}

impl PreSubscription {
    /// Rule subscribing every device to one resource path.
    #[must_use]
    pub fn resource_path(path: impl Into<String>) -> Self {
        Self {
            endpoint_name: None,
            endpoint_type: None,
            resource_path: vec![path.into()],
        }
    }

    /// Rule matching devices by endpoint name.
    #[must_use]
    pub fn endpoint_name(name: impl Into<String>) -> Self {
        Self {
            endpoint_name: Some(name.into()),
            endpoint_type: None,
            resource_path: Vec::new(),
        }
    }

    /// Rule matching devices by endpoint type.
    #[must_use]
    pub fn endpoint_type(endpoint_type: impl Into<String>) -> Self {
        Self {
            endpoint_name: None,
            endpoint_type: Some(endpoint_type.into()),
            resource_path: Vec::new(),
        }
    }
}

// ============================================================================
// Round Trip
// ============================================================================

/// Sends a device request and waits for its async response.
///
/// Generates a fresh correlation id, posts the request, then polls the
/// waiter's store until the response arrives or `timeout` passes. Call
/// sites that need a caller-chosen id or delivery options can compose
/// [`CloudClient::send_device_request_with`] with
/// [`EventWaiter::wait_for_async_response`] instead.
///
/// # Errors
///
/// Control-plane errors from the post, or [`Error::WaitTimeout`] when
/// the device does not answer in time.
///
/// [`Error::WaitTimeout`]: crate::Error::WaitTimeout
pub async fn send_and_await_response(
    client: &CloudClient,
    waiter: &EventWaiter,
    device: &DeviceId,
    request: &DeviceRequest,
    timeout: Duration,
) -> Result<AsyncResponse> {
    let async_id = AsyncId::generate();
    debug!(device_id = %device, async_id = %async_id, "device request round trip");
    client
        .send_device_request(device, &async_id, request)
        .await?;
    waiter.require_async_response(&async_id, timeout).await
}

// ============================================================================
// Tests
// ============================================================================
