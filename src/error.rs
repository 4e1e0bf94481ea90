//! Error types for the Pelion system-test library.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use pelion_systest::{NotificationChannel, Result};
//!
//! async fn example(channel: &NotificationChannel) -> Result<()> {
//!     channel.open().await?;
//!     channel.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Control plane | [`Error::UnexpectedStatus`], [`Error::Http`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::Unauthorized`] |
//! | Protocol | [`Error::Protocol`], [`Error::PayloadDecode`], [`Error::Json`] |
//! | Waiting | [`Error::WaitTimeout`] |
//! | Remote terminal | [`Error::TerminalTooSlow`], [`Error::Terminal`] |
//! | External | [`Error::Io`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;
use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when cloud configuration is invalid or incomplete.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Control-Plane Errors
    // ========================================================================
    /// Control-plane call returned an unexpected HTTP status.
    ///
    /// Returned when a REST operation does not answer with the status
    /// the service contract requires.
    #[error("{operation} returned unexpected status {status}")]
    UnexpectedStatus {
        /// The operation that was attempted.
        operation: String,
        /// The HTTP status actually received.
        status: u16,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Streaming connection failed.
    ///
    /// Returned when a WebSocket connection cannot be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Streaming connection closed unexpectedly.
    ///
    /// Returned when the connection is lost during an operation.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Credentials rejected by the service.
    ///
    /// Terminal for a notification channel: the network loop stops
    /// retrying once it sees this.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of the rejection.
        message: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Protocol violation or unexpected message shape.
    ///
    /// Returned when an inbound message is missing a required field.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Payload transport decoding failed.
    ///
    /// Returned when a base64 payload cannot be decoded, or decodes to
    /// bytes that are not valid UTF-8 where text was expected.
    #[error("Payload decode error: {message}")]
    PayloadDecode {
        /// Description of the decode failure.
        message: String,
    },

    // ========================================================================
    // Wait Errors
    // ========================================================================
    /// Strict wait elapsed without a matching event.
    ///
    /// Returned by the `require_*` wait variants; the non-strict
    /// `wait_for_*` variants return `None` instead.
    #[error("Timed out waiting for {what} after {timeout_secs}s")]
    WaitTimeout {
        /// What was being waited for, including the identifier searched.
        what: String,
        /// Seconds waited before giving up.
        timeout_secs: u64,
    },

    // ========================================================================
    // Remote Terminal Errors
    // ========================================================================
    /// Remote device did not produce output within the read deadline.
    #[error("Remote terminal too slow: no response within {timeout_secs}s")]
    TerminalTooSlow {
        /// Seconds waited before giving up.
        timeout_secs: u64,
    },

    /// Remote terminal command failed for a non-timeout reason.
    #[error("Remote terminal failed: {message}")]
    Terminal {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an unexpected status error.
    #[inline]
    pub fn unexpected_status(operation: impl Into<String>, status: u16) -> Self {
        Self::UnexpectedStatus {
            operation: operation.into(),
            status,
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates an unauthorized error.
    #[inline]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a payload decode error.
    #[inline]
    pub fn payload_decode(message: impl Into<String>) -> Self {
        Self::PayloadDecode {
            message: message.into(),
        }
    }

    /// Creates a wait timeout error.
    #[inline]
    pub fn wait_timeout(what: impl Into<String>, timeout: Duration) -> Self {
        Self::WaitTimeout {
            what: what.into(),
            timeout_secs: timeout.as_secs(),
        }
    }

    /// Creates a terminal-too-slow error.
    #[inline]
    pub fn terminal_too_slow(timeout: Duration) -> Self {
        Self::TerminalTooSlow {
            timeout_secs: timeout.as_secs(),
        }
    }

    /// Creates a generic remote terminal error.
    #[inline]
    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal {
            message: message.into(),
        }
    }

    /// Classifies a socket handshake failure.
    ///
    /// A rejected credential becomes [`Error::Unauthorized`]; anything
    /// else stays a transport error.
    pub(crate) fn from_handshake(err: WsError) -> Self {
        if let WsError::Http(response) = &err {
            let status = response.status();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Self::unauthorized(format!("handshake rejected with status {status}"));
            }
        }
        Self::WebSocket(err)
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::WaitTimeout { .. } | Self::TerminalTooSlow { .. }
        )
    }

    /// Returns `true` if this is an authentication failure.
    #[inline]
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionClosed | Self::WebSocket(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
