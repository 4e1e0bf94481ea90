//! In-memory store of classified notification events.
//!
//! One [`EventStore`] lives per channel. The channel's classification task
//! is the only writer; test code reads concurrently through the wait API.
//! Events are retained for the lifetime of the channel — reads are
//! non-destructive, so the same event can satisfy several independent
//! waits (and a reused identifier can match a stale event; fixtures avoid
//! this by scoping one channel per test).
//!
//! # Containers
//!
//! | Kind | Container | Semantics |
//! |------|-----------|-----------|
//! | registrations, reg-updates | ordered sequence | append-only |
//! | de-registrations, expirations | ordered sequence | append-only |
//! | notifications | ordered sequence | append-only |
//! | async-responses | map by async id | last write wins |

// ============================================================================
// Imports
// ============================================================================

use chrono::Utc;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::identifiers::{AsyncId, DeviceId};
use crate::protocol::envelope::NotificationEnvelope;
use crate::protocol::event::{
    AsyncResponse, DeviceEvent, NotificationEvent, RegistrationEvent, ResourceNotification,
    classify,
};

// ============================================================================
// EventStore
// ============================================================================

/// Thread-safe, per-channel collection of classified events.
#[derive(Debug, Default)]
pub struct EventStore {
    /// Full registrations, in arrival order.
    registrations: RwLock<Vec<RegistrationEvent>>,
    /// Registration renewals, in arrival order.
    registration_updates: RwLock<Vec<RegistrationEvent>>,
    /// Clean deregistrations, in arrival order.
    deregistrations: RwLock<Vec<DeviceEvent>>,
    /// Lapsed registrations, in arrival order.
    registrations_expired: RwLock<Vec<DeviceEvent>>,
    /// Resource value notifications, in arrival order.
    notifications: RwLock<Vec<ResourceNotification>>,
    /// Async responses, one per correlation id.
    async_responses: RwLock<FxHashMap<AsyncId, AsyncResponse>>,
}

impl EventStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================================
// Ingest Side
// ============================================================================

impl EventStore {
    /// Classifies one envelope and routes its items into the store.
    ///
    /// Stamps every item with the current time, normalizes bare-id
    /// de-registration shapes, drops unknown categories with a log line.
    /// Never blocks on anything but the store's own short-lived locks.
    pub fn ingest(&self, envelope: NotificationEnvelope) {
        if envelope.is_empty() {
            debug!("received empty notification push");
            return;
        }
        for category in envelope.unknown_categories() {
            warn!(category, "dropping unknown notification category");
        }

        let received_at = Utc::now();
        for event in classify(envelope, received_at) {
            self.route(event);
        }
    }

    /// Appends one classified event to its container.
    fn route(&self, event: NotificationEvent) {
        match event {
            NotificationEvent::Registration(event) => {
                debug!(device_id = %event.device_id, "got registration notification");
                self.registrations.write().push(event);
            }
            NotificationEvent::RegistrationUpdate(event) => {
                debug!(device_id = %event.device_id, "got registration update notification");
                self.registration_updates.write().push(event);
            }
            NotificationEvent::Deregistration(event) => {
                debug!(device_id = %event.device_id, "got deregistration notification");
                self.deregistrations.write().push(event);
            }
            NotificationEvent::RegistrationExpired(event) => {
                debug!(device_id = %event.device_id, "got registration expiry notification");
                self.registrations_expired.write().push(event);
            }
            NotificationEvent::Notification(event) => {
                debug!(
                    device_id = %event.device_id,
                    path = %event.resource_path,
                    "got resource notification"
                );
                self.notifications.write().push(event);
            }
            NotificationEvent::AsyncResponse(event) => {
                debug!(async_id = %event.async_id, "got async response");
                self.async_responses
                    .write()
                    .insert(event.async_id.clone(), event);
            }
        }
    }
}

// ============================================================================
// Query Side
// ============================================================================

impl EventStore {
    /// Returns the first registration for a device, if any.
    #[must_use]
    pub fn registration_for(&self, device_id: &DeviceId) -> Option<RegistrationEvent> {
        Self::first_registration(&self.registrations, device_id)
    }

    /// Returns the first registration update for a device, if any.
    #[must_use]
    pub fn registration_update_for(&self, device_id: &DeviceId) -> Option<RegistrationEvent> {
        Self::first_registration(&self.registration_updates, device_id)
    }

    /// Returns the first deregistration for a device, if any.
    #[must_use]
    pub fn deregistration_for(&self, device_id: &DeviceId) -> Option<DeviceEvent> {
        Self::first_device_event(&self.deregistrations, device_id)
    }

    /// Returns the first registration expiry for a device, if any.
    #[must_use]
    pub fn expiration_for(&self, device_id: &DeviceId) -> Option<DeviceEvent> {
        Self::first_device_event(&self.registrations_expired, device_id)
    }

    /// Returns the first notification matching device, path and decoded
    /// payload text.
    ///
    /// Payloads that do not decode to UTF-8 match nothing.
    #[must_use]
    pub fn notification_matching(
        &self,
        device_id: &DeviceId,
        resource_path: &str,
        expected: &str,
    ) -> Option<ResourceNotification> {
        self.notifications
            .read()
            .iter()
            .find(|event| {
                event.device_id == *device_id
                    && event.resource_path == resource_path
                    && event.payload.matches_text(expected)
            })
            .cloned()
    }

    /// Returns every notification for a device and path, in arrival order.
    #[must_use]
    pub fn notifications_for(
        &self,
        device_id: &DeviceId,
        resource_path: &str,
    ) -> Vec<ResourceNotification> {
        self.notifications
            .read()
            .iter()
            .filter(|event| {
                event.device_id == *device_id && event.resource_path == resource_path
            })
            .cloned()
            .collect()
    }

    /// Looks up the async response for a correlation id.
    #[must_use]
    pub fn async_response(&self, async_id: &AsyncId) -> Option<AsyncResponse> {
        self.async_responses.read().get(async_id).cloned()
    }

    /// Returns a consistent size snapshot of every container.
    #[must_use]
    pub fn counts(&self) -> StoreCounts {
        StoreCounts {
            registrations: self.registrations.read().len(),
            registration_updates: self.registration_updates.read().len(),
            deregistrations: self.deregistrations.read().len(),
            registrations_expired: self.registrations_expired.read().len(),
            notifications: self.notifications.read().len(),
            async_responses: self.async_responses.read().len(),
        }
    }

    /// First registration-shaped event matching a device id.
    fn first_registration(
        bucket: &RwLock<Vec<RegistrationEvent>>,
        device_id: &DeviceId,
    ) -> Option<RegistrationEvent> {
        bucket
            .read()
            .iter()
            .find(|event| event.device_id == *device_id)
            .cloned()
    }

    /// First device-shaped event matching a device id.
    fn first_device_event(
        bucket: &RwLock<Vec<DeviceEvent>>,
        device_id: &DeviceId,
    ) -> Option<DeviceEvent> {
        bucket
            .read()
            .iter()
            .find(|event| event.device_id == *device_id)
            .cloned()
    }
}

// ============================================================================
// StoreCounts
// ============================================================================

/// Per-container sizes at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCounts {
    /// Registrations held.
    pub registrations: usize,
    /// Registration updates held.
    pub registration_updates: usize,
    /// Deregistrations held.
    pub deregistrations: usize,
    /// Registration expirations held.
    pub registrations_expired: usize,
    /// Resource notifications held.
    pub notifications: usize,
    /// Async responses held (one per id).
    pub async_responses: usize,
}

impl StoreCounts {
    /// Total events across every container.
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.registrations
            + self.registration_updates
            + self.deregistrations
            + self.registrations_expired
            + self.notifications
            + self.async_responses
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use proptest::prelude::*;
    use serde_json::json;

    use crate::protocol::event::Payload;

    fn envelope(value: serde_json::Value) -> NotificationEnvelope {
        serde_json::from_value(value).expect("build envelope")
    }

    fn notification(device: &str, path: &str, value: &str) -> NotificationEnvelope {
        envelope(json!({
            "notifications": [{
                "ep": device,
                "path": path,
                "payload": Payload::from_text(value).as_base64(),
            }]
        }))
    }

    #[test]
    fn test_ingest_routes_all_kinds() {
        let store = EventStore::new();
        store.ingest(envelope(json!({
            "registrations": [{ "ep": "device-1" }],
            "reg-updates": [{ "ep": "device-1" }],
            "de-registrations": ["device-1"],
            "registrations-expired": [{ "ep": "device-1" }],
            "notifications": [{ "ep": "device-1", "path": "/1/0/1", "payload": "NDI=" }],
            "async-responses": [{ "id": "req-1", "status": 200 }]
        })));

        let counts = store.counts();
        assert_eq!(counts.registrations, 1);
        assert_eq!(counts.registration_updates, 1);
        assert_eq!(counts.deregistrations, 1);
        assert_eq!(counts.registrations_expired, 1);
        assert_eq!(counts.notifications, 1);
        assert_eq!(counts.async_responses, 1);
        assert_eq!(counts.total(), 6);
    }

    #[test]
    fn test_queries_are_non_destructive() {
        let store = EventStore::new();
        store.ingest(envelope(json!({ "registrations": [{ "ep": "device-1" }] })));

        let device = DeviceId::new("device-1");
        let first = store.registration_for(&device);
        let second = store.registration_for(&device);
        assert!(first.is_some());
        assert!(second.is_some());
        assert_eq!(store.counts().registrations, 1);
    }

    #[test]
    fn test_bare_id_deregistration_normalized() {
        let store = EventStore::new();
        store.ingest(envelope(json!({ "de-registrations": ["device-2"] })));

        let event = store
            .deregistration_for(&DeviceId::new("device-2"))
            .expect("deregistration");
        assert_eq!(event.device_id.as_str(), "device-2");
    }

    #[test]
    fn test_async_response_overwrite_last_wins() {
        let store = EventStore::new();
        store.ingest(envelope(json!({
            "async-responses": [{ "id": "req-1", "status": 200, "payload": "Zmlyc3Q=" }]
        })));
        store.ingest(envelope(json!({
            "async-responses": [{ "id": "req-1", "status": 200, "payload": "c2Vjb25k" }]
        })));

        let response = store.async_response(&AsyncId::new("req-1")).expect("response");
        assert_eq!(response.decoded_payload().unwrap(), "second");
        assert_eq!(store.counts().async_responses, 1);
    }

    #[test]
    fn test_notification_matching_decodes_payload() {
        let store = EventStore::new();
        store.ingest(notification("device-1", "/3303/0/5700", "42"));

        let device = DeviceId::new("device-1");
        assert!(store.notification_matching(&device, "/3303/0/5700", "42").is_some());
        assert!(store.notification_matching(&device, "/3303/0/5700", "43").is_none());
        assert!(store.notification_matching(&device, "/3303/0/5701", "42").is_none());
        assert!(
            store
                .notification_matching(&DeviceId::new("device-2"), "/3303/0/5700", "42")
                .is_none()
        );
    }

    #[test]
    fn test_notifications_for_collects_in_order() {
        let store = EventStore::new();
        store.ingest(notification("device-1", "/1/0/1", "1"));
        store.ingest(notification("device-1", "/1/0/1", "2"));
        store.ingest(notification("device-1", "/2/0/2", "3"));

        let events = store.notifications_for(&DeviceId::new("device-1"), "/1/0/1");
        assert_eq!(events.len(), 2);
        assert!(events[0].payload.matches_text("1"));
        assert!(events[1].payload.matches_text("2"));
    }

    #[test]
    fn test_unknown_category_dropped() {
        let store = EventStore::new();
        store.ingest(envelope(json!({
            "firmware-manifests": [{ "id": "m-1" }]
        })));
        assert_eq!(store.counts().total(), 0);
    }

    // Single writer appending while a reader polls; the store must end up
    // with every event intact and nothing duplicated.
    #[test]
    fn test_concurrent_append_and_scan_integrity() {
        let store = Arc::new(EventStore::new());
        let device = DeviceId::new("device-1");

        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..1000 {
                    store.ingest(notification("device-1", "/1/0/1", &i.to_string()));
                }
            })
        };

        for _ in 0..50 {
            let snapshot = store.notifications_for(&device, "/1/0/1");
            for event in &snapshot {
                assert!(event.payload.decode_utf8().is_ok());
            }
            thread::sleep(Duration::from_millis(1));
        }
        writer.join().expect("writer thread");

        let events = store.notifications_for(&device, "/1/0/1");
        assert_eq!(events.len(), 1000);
        assert_eq!(store.counts().notifications, 1000);

        let values: HashSet<String> = events
            .iter()
            .map(|event| event.payload.decode_utf8().unwrap())
            .collect();
        assert_eq!(values.len(), 1000);
    }

    proptest! {
        // Every pushed id is findable; an id never pushed is not.
        #[test]
        fn prop_distinct_registrations_found(
            ids in proptest::collection::hash_set("[a-f0-9]{8}", 1..20)
        ) {
            let store = EventStore::new();
            for id in &ids {
                store.ingest(envelope(json!({ "registrations": [{ "ep": id }] })));
            }

            for id in &ids {
                let device = DeviceId::new(id.clone());
                let event = store.registration_for(&device);
                prop_assert!(event.is_some());
                let event = event.unwrap();
                prop_assert_eq!(event.device_id.as_str(), id.as_str());
            }
            prop_assert!(store.registration_for(&DeviceId::new("never-pushed")).is_none());
        }

        // Async map holds exactly the latest response per id.
        #[test]
        fn prop_async_map_last_write_wins(
            first in "[a-z]{1,12}",
            second in "[a-z]{1,12}",
        ) {
            let store = EventStore::new();
            for value in [&first, &second] {
                store.ingest(envelope(json!({
                    "async-responses": [{
                        "id": "req-1",
                        "status": 200,
                        "payload": Payload::from_text(value).as_base64(),
                    }]
                })));
            }

            let response = store.async_response(&AsyncId::new("req-1")).unwrap();
            prop_assert_eq!(response.decoded_payload().unwrap(), second);
            prop_assert_eq!(store.counts().async_responses, 1);
        }
    }
}
