//! Control-plane access to the device-management REST API.
//!
//! The notification socket only streams events; everything that sets the
//! stream up or pokes a device goes through HTTPS. This module holds that
//! REST surface:
//!
//! | Part | Purpose |
//! |------|---------|
//! | [`CloudClient`] | REST calls with bearer authentication |
//! | [`ControlPlane`] | The slice of the REST surface the channel lifecycle needs |
//! | [`DeviceRequest`] | Body of a `POST /v2/device-requests/{id}` call |
//! | [`PreSubscription`] | One account-wide subscription rule |
//!
//! The channel lifecycle depends on [`ControlPlane`] rather than on
//! [`CloudClient`] directly so tests can drive it against an in-process
//! fake without a listening server.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::Result;
use crate::identifiers::ApiKey;

pub mod client;
pub mod requests;

pub use client::CloudClient;
pub use requests::{DeviceRequest, PreSubscription, RequestOptions, send_and_await_response};

// ============================================================================
// ControlPlane
// ============================================================================

/// REST operations the notification channel lifecycle depends on.
///
/// Implemented by [`CloudClient`] for real use and by in-process fakes in
/// tests.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Registers the account's notification channel.
    ///
    /// `configuration` is passed through as the registration body when
    /// given; `None` registers with service defaults.
    async fn register_notification_channel(&self, configuration: Option<&Value>) -> Result<()>;

    /// Removes the account's notification channel registration.
    async fn delete_notification_channel(&self) -> Result<()>;

    /// Streaming URL the channel's socket connects to.
    fn notification_socket_url(&self) -> Url;

    /// Credential presented during the socket handshake.
    fn api_key(&self) -> &ApiKey;
}
