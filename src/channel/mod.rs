//! Notification channel: registration, streaming, and waits.
//!
//! The channel is the crate's event backbone. Once opened it receives
//! every notification the account's devices produce and files them for
//! later queries, so test code can assert on events that happened before
//! it got around to looking.
//!
//! | Part | Purpose |
//! |------|---------|
//! | [`NotificationChannel`] | Registers the channel and owns its session |
//! | [`Connection`] | Keeps the socket alive, reconnecting on failure |
//! | [`EventWaiter`] | Deadline-bounded polling over received events |
//!
//! A typical session: open the channel, exercise the device under test,
//! wait for the resulting events, close the channel. The channel is
//! account-wide; one open channel observes every device the key can see.

pub mod connection;
pub mod lifecycle;
pub mod wait;

pub use connection::{Connection, SocketState};
pub use lifecycle::NotificationChannel;
pub use wait::{
    DEFAULT_POLL_INTERVAL, DEFAULT_REGISTRATION_TIMEOUT, DEFAULT_WAIT_TIMEOUT, EventWaiter,
};
