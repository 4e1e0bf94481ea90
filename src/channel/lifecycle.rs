//! Notification channel lifecycle.
//!
//! [`NotificationChannel`] owns the full arc of a channel session: it
//! registers the channel on the control plane, brings up the streaming
//! [`Connection`], and on close tears both down in the reverse order.
//! One instance per access key; registering again with the same key
//! replaces the previous channel on the service side.
//!
//! The settle delays around registration and teardown mirror how the
//! service behaves in practice: a socket connected immediately after
//! registration is sometimes refused, and a registration deleted while
//! frames are still in flight loses them.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use pelion_systest::{CloudClient, CloudConfig, DeviceId, NotificationChannel};
//!
//! # async fn example() -> pelion_systest::Result<()> {
//! let client = CloudClient::new(CloudConfig::from_env()?)?;
//! let channel = NotificationChannel::new(Arc::new(client));
//!
//! channel.open().await?;
//! let registration = channel
//!     .events()
//!     .wait_for_registration(&DeviceId::new("device-1"), Duration::from_secs(60))
//!     .await;
//! channel.close().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::channel::connection::{Connection, SocketState};
use crate::channel::wait::EventWaiter;
use crate::cloud::ControlPlane;
use crate::error::Result;
use crate::store::EventStore;

// ============================================================================
// Constants
// ============================================================================

/// Pause between channel registration and the socket handshake.
const REGISTRATION_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Pause between closing the socket and deleting the registration.
const CLOSE_SETTLE_DELAY: Duration = Duration::from_secs(2);

// ============================================================================
// NotificationChannel
// ============================================================================

/// A registered notification channel and its streaming connection.
pub struct NotificationChannel {
    control: Arc<dyn ControlPlane>,
    store: Arc<EventStore>,
    connection: Connection,
    /// Whether this instance holds a registration to clean up.
    registered: AtomicBool,
    registration_settle: Duration,
    close_settle: Duration,
}

impl NotificationChannel {
    /// Creates a closed channel bound to a control plane.
    ///
    /// No network traffic happens until [`open`](Self::open).
    #[must_use]
    pub fn new(control: Arc<dyn ControlPlane>) -> Self {
        let store = Arc::new(EventStore::new());
        let connection = Connection::new(
            control.notification_socket_url(),
            control.api_key().clone(),
            Arc::clone(&store),
        );
        Self {
            control,
            store,
            connection,
            registered: AtomicBool::new(false),
            registration_settle: REGISTRATION_SETTLE_DELAY,
            close_settle: CLOSE_SETTLE_DELAY,
        }
    }

    /// Overrides the settle delays around registration and teardown.
    ///
    /// The defaults match the live service; local test servers need no
    /// settling.
    #[must_use]
    pub fn with_settle_delays(mut self, registration: Duration, close: Duration) -> Self {
        self.registration_settle = registration;
        self.close_settle = close;
        self
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Registers the channel and opens the streaming connection.
    ///
    /// Registration happens first; if the control plane refuses it, no
    /// socket is opened and the error is returned as is. Calling `open`
    /// on an already open channel is a no-op.
    pub async fn open(&self) -> Result<()> {
        self.open_with(None).await
    }

    /// Like [`open`](Self::open), with a channel configuration object
    /// passed through as the registration body.
    pub async fn open_with(&self, configuration: Option<&Value>) -> Result<()> {
        if self.connection.is_running() {
            warn!("notification channel already open");
            return Ok(());
        }

        info!("opening notification channel");
        self.control
            .register_notification_channel(configuration)
            .await?;
        self.registered.store(true, Ordering::SeqCst);

        // Let the registration propagate before the handshake.
        tokio::time::sleep(self.registration_settle).await;
        self.connection.open();
        Ok(())
    }

    /// Closes the streaming connection and deletes the registration.
    ///
    /// The registration is deleted at most once per successful
    /// [`open`](Self::open); closing an unopened channel does nothing.
    pub async fn close(&self) -> Result<()> {
        self.connection.close();

        if !self.registered.swap(false, Ordering::SeqCst) {
            debug!("notification channel holds no registration");
            return Ok(());
        }

        // Drain in-flight frames before dropping the registration.
        tokio::time::sleep(self.close_settle).await;
        info!("deleting notification channel registration");
        self.control.delete_notification_channel().await
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns a waiter over this channel's events.
    #[must_use]
    pub fn events(&self) -> EventWaiter {
        EventWaiter::new(Arc::clone(&self.store))
    }

    /// Returns the backing event store.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    /// Returns the streaming connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SocketState {
        self.connection.state()
    }

    /// Returns `true` while the streaming connection is up.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.connection.is_running()
    }

    /// Returns `true` once the service has rejected the access key.
    #[inline]
    #[must_use]
    pub fn auth_failed(&self) -> bool {
        self.connection.auth_failed()
    }
}

// ============================================================================
// Tests
// ============================================================================
