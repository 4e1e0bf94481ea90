//! System-test support library for Izuma/Pelion device management.
//!
//! Device-management tests revolve around one question: did the cloud see
//! what the device just did? This crate answers it by keeping a
//! notification channel open for the whole test session and recording
//! everything the service pushes, so assertions can look events up after
//! the fact instead of racing the socket.
//!
//! # Architecture
//!
//! Three cooperating layers:
//!
//! - **Control plane** ([`CloudClient`]): REST calls that register the
//!   channel, manage subscriptions, and relay device requests.
//! - **Notification channel** ([`NotificationChannel`]): a streaming
//!   socket feeding every pushed event into an in-memory [`EventStore`],
//!   with [`EventWaiter`] turning store lookups into deadline-bounded
//!   waits.
//! - **Remote terminal** ([`RemoteTerminal`]): command execution on
//!   gateway devices over their console socket.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pelion_systest::{CloudClient, CloudConfig, DeviceId, NotificationChannel, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = CloudClient::new(CloudConfig::from_env()?)?;
//!     let channel = NotificationChannel::new(Arc::new(client));
//!     channel.open().await?;
//!
//!     // Power-cycle the device under test here, then:
//!     let device = DeviceId::new("0161661e9ce1000000000001001002b5");
//!     let registration = channel
//!         .events()
//!         .wait_for_registration(&device, Duration::from_secs(120))
//!         .await;
//!     assert!(registration.is_some(), "device never came back");
//!
//!     channel.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`channel`] | Notification channel lifecycle, streaming, waits |
//! | [`cloud`] | Control-plane REST client and request bodies |
//! | [`config`] | Gateway address, access key, derived endpoints |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe id wrappers |
//! | [`protocol`] | Wire formats and event classification |
//! | [`store`] | In-memory event store behind the channel |
//! | [`terminal`] | Remote terminal client for gateway devices |

// ============================================================================
// Modules
// ============================================================================

/// Notification channel: registration, streaming connection, waits.
///
/// The usual entry point is [`NotificationChannel`].
pub mod channel;

/// Control-plane REST access.
///
/// [`CloudClient`] implements [`ControlPlane`], the slice the channel
/// lifecycle depends on.
pub mod cloud;

/// Cloud access configuration.
///
/// Built with [`CloudConfig::builder()`] or read from the environment
/// with [`CloudConfig::from_env()`].
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for cloud entities.
///
/// Newtype wrappers prevent mixing incompatible ids at compile time.
pub mod identifiers;

/// Wire-format types for both sockets.
///
/// Internal shapes plus the classification into typed events.
pub mod protocol;

/// In-memory store of everything the channel received.
pub mod store;

/// Remote terminal client.
pub mod terminal;

#[cfg(test)]
mod testutil;

// ============================================================================
// Re-exports
// ============================================================================

// Channel types
pub use channel::{Connection, EventWaiter, NotificationChannel, SocketState};

// Control-plane types
pub use cloud::{
    CloudClient, ControlPlane, DeviceRequest, PreSubscription, RequestOptions,
    send_and_await_response,
};

// Configuration
pub use config::{CloudConfig, CloudConfigBuilder};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{ApiKey, AsyncId, DeviceId};

// Event types
pub use protocol::{
    AsyncResponse, DeviceEvent, EventKind, NotificationEvent, Payload, RegistrationEvent,
    ResourceNotification,
};

// Store types
pub use store::{EventStore, StoreCounts};

// Remote terminal
pub use terminal::{RemoteTerminal, strip_ansi_escapes};
