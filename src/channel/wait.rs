//! Polling waits over the event store.
//!
//! Test code rarely cares about the instant an event arrives, only that
//! it arrives within some deadline. [`EventWaiter`] turns the store's
//! synchronous queries into awaitable ones: probe, sleep, probe again,
//! until the event shows up or the deadline passes.
//!
//! Waits never consume events. Two concurrent waits for the same event
//! both succeed, and an event that arrived before the wait began is
//! found on the first probe. A zero timeout degenerates to exactly one
//! probe, which makes the `wait_for_*` family double as non-blocking
//! queries.
//!
//! The `wait_for_*` methods answer "did it happen?" with an `Option`;
//! the `require_*` variants turn absence into [`Error::WaitTimeout`]
//! for call sites that treat a missing event as a test failure.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::{AsyncId, DeviceId};
use crate::protocol::event::{AsyncResponse, DeviceEvent, RegistrationEvent, ResourceNotification};
use crate::store::EventStore;

// ============================================================================
// Constants
// ============================================================================

/// Pause between store probes unless overridden.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Wait deadline for notification and async-response waits.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait deadline for registration-lifecycle waits, which ride on device
/// reboot and network attach times.
pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// EventWaiter
// ============================================================================

/// Awaitable queries over a shared [`EventStore`].
///
/// Cheap to clone; clones share the store and can wait concurrently.
#[derive(Debug, Clone)]
pub struct EventWaiter {
    store: Arc<EventStore>,
    poll_interval: Duration,
}

impl EventWaiter {
    /// Creates a waiter polling at [`DEFAULT_POLL_INTERVAL`].
    #[must_use]
    pub fn new(store: Arc<EventStore>) -> Self {
        Self {
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the pause between probes.
    ///
    /// Mostly useful for resources that settle faster than the default
    /// one-second cadence, or for tightening test turnaround.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Returns the store this waiter reads from.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<EventStore> {
        &self.store
    }

    // ========================================================================
    // Registration lifecycle
    // ========================================================================

    /// Waits for a full registration from `device`.
    pub async fn wait_for_registration(
        &self,
        device: &DeviceId,
        timeout: Duration,
    ) -> Option<RegistrationEvent> {
        debug!(device_id = %device, "waiting for registration");
        self.poll_until(timeout, || self.store.registration_for(device))
            .await
    }

    /// Waits for a registration update from `device`.
    pub async fn wait_for_registration_update(
        &self,
        device: &DeviceId,
        timeout: Duration,
    ) -> Option<RegistrationEvent> {
        debug!(device_id = %device, "waiting for registration update");
        self.poll_until(timeout, || self.store.registration_update_for(device))
            .await
    }

    /// Waits for `device` to deregister.
    pub async fn wait_for_deregistration(
        &self,
        device: &DeviceId,
        timeout: Duration,
    ) -> Option<DeviceEvent> {
        debug!(device_id = %device, "waiting for deregistration");
        self.poll_until(timeout, || self.store.deregistration_for(device))
            .await
    }

    /// Waits for the registration of `device` to expire.
    pub async fn wait_for_expiration(
        &self,
        device: &DeviceId,
        timeout: Duration,
    ) -> Option<DeviceEvent> {
        debug!(device_id = %device, "waiting for registration expiry");
        self.poll_until(timeout, || self.store.expiration_for(device))
            .await
    }

    // ========================================================================
    // Resource notifications
    // ========================================================================

    /// Waits for a notification from `device` on `path` whose decoded
    /// payload equals `expected`.
    ///
    /// Payloads are compared as strings after base64 decoding, so an
    /// integer resource reporting `42` matches `expected = "42"`.
    pub async fn wait_for_notification(
        &self,
        device: &DeviceId,
        path: &str,
        expected: &str,
        timeout: Duration,
    ) -> Option<ResourceNotification> {
        debug!(device_id = %device, path, expected, "waiting for notification value");
        self.poll_until(timeout, || {
            self.store.notification_matching(device, path, expected)
        })
        .await
    }

    /// Waits for any notification from `device` on `path`, regardless of
    /// its value.
    pub async fn wait_for_resource_notification(
        &self,
        device: &DeviceId,
        path: &str,
        timeout: Duration,
    ) -> Option<ResourceNotification> {
        debug!(device_id = %device, path, "waiting for notification");
        self.poll_until(timeout, || {
            self.store.notifications_for(device, path).into_iter().next()
        })
        .await
    }

    /// Waits until every `(path, expected)` pair has a matching
    /// notification from `device`.
    ///
    /// Returns the matches in the order the pairs were given, or `None`
    /// if any of them is still missing at the deadline.
    pub async fn wait_for_notifications(
        &self,
        device: &DeviceId,
        expectations: &[(&str, &str)],
        timeout: Duration,
    ) -> Option<Vec<ResourceNotification>> {
        debug!(
            device_id = %device,
            count = expectations.len(),
            "waiting for notification set"
        );
        self.poll_until(timeout, || {
            let mut matches = Vec::with_capacity(expectations.len());
            for (path, expected) in expectations {
                matches.push(self.store.notification_matching(device, path, expected)?);
            }
            Some(matches)
        })
        .await
    }

    // ========================================================================
    // Async responses
    // ========================================================================

    /// Waits for the response to a device request.
    pub async fn wait_for_async_response(
        &self,
        async_id: &AsyncId,
        timeout: Duration,
    ) -> Option<AsyncResponse> {
        debug!(async_id = %async_id, "waiting for async response");
        self.poll_until(timeout, || self.store.async_response(async_id))
            .await
    }

    // ========================================================================
    // Strict variants
    // ========================================================================

    /// Like [`wait_for_notification`](Self::wait_for_notification) but
    /// absence is an error.
    pub async fn require_notification(
        &self,
        device: &DeviceId,
        path: &str,
        expected: &str,
        timeout: Duration,
    ) -> Result<ResourceNotification> {
        self.wait_for_notification(device, path, expected, timeout)
            .await
            .ok_or_else(|| {
                Error::wait_timeout(
                    format!("notification {expected} on {path} from device {device}"),
                    timeout,
                )
            })
    }

    /// Like [`wait_for_async_response`](Self::wait_for_async_response)
    /// but absence is an error.
    pub async fn require_async_response(
        &self,
        async_id: &AsyncId,
        timeout: Duration,
    ) -> Result<AsyncResponse> {
        self.wait_for_async_response(async_id, timeout)
            .await
            .ok_or_else(|| {
                Error::wait_timeout(format!("async response with id {async_id}"), timeout)
            })
    }

    // ========================================================================
    // Polling core
    // ========================================================================

    /// Probes until `probe` yields or `timeout` elapses.
    ///
    /// Probes immediately, so an already-stored event returns without
    /// sleeping and a zero timeout means exactly one probe. The final
    /// sleep is clamped to the remaining time, keeping the total wait
    /// within `timeout` plus one probe.
    async fn poll_until<T>(
        &self,
        timeout: Duration,
        mut probe: impl FnMut() -> Option<T>,
    ) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(found) = probe() {
                return Some(found);
            }
            let now = Instant::now();
            if now >= deadline {
                trace!("wait deadline reached");
                return None;
            }
            let pause = self.poll_interval.min(deadline - now);
            tokio::time::sleep(pause).await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
