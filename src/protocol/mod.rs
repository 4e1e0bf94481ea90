//! Wire-format types for the notification and remote-terminal protocols.
//!
//! This module owns every JSON shape that crosses a socket, plus the
//! classification step that turns raw envelopes into typed events.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `NotificationEnvelope` | Service → Client | Batch of server-pushed items |
//! | `NotificationEvent` | internal | Classified, timestamped item |
//! | `TerminalInput` | Client → Device | Remote-terminal command frame |
//!
//! # Envelope Categories
//!
//! The notification service batches items under category keys:
//!
//! - `registrations`, `reg-updates` (full registration objects)
//! - `de-registrations`, `registrations-expired` (ids or objects)
//! - `notifications` (resource values, base64 payloads)
//! - `async-responses` (correlated by async id)
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `envelope` | Inbound notification envelope and its item shapes |
//! | `event` | Classified events and payload transport encoding |
//! | `terminal` | Remote-terminal frames |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound notification envelope.
pub mod envelope;

/// Classified event types.
pub mod event;

/// Remote-terminal frame types.
pub mod terminal;

// ============================================================================
// Re-exports
// ============================================================================

pub use envelope::{
    AsyncResponseItem, DeviceRef, NotificationEnvelope, NotificationItem, RegistrationItem,
    ResourceInfo,
};
pub use event::{
    AsyncResponse, DeviceEvent, EventKind, NotificationEvent, Payload, RegistrationEvent,
    ResourceNotification, classify,
};
pub use terminal::TerminalInput;
