//! Remote-terminal frame types.
//!
//! The device console speaks a thin JSON framing: the client sends typed
//! frames, the device answers with objects carrying a `payload` text
//! field.
//!
//! # Format
//!
//! ```json
//! { "type": "input", "payload": "uname -a\r" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// TerminalInput
// ============================================================================

/// An outbound console input frame.
///
/// The trailing carriage return is part of the protocol: the device shell
/// executes the line only once it sees the terminator.
#[derive(Debug, Clone, Serialize)]
pub struct TerminalInput {
    /// Frame type marker (always "input").
    #[serde(rename = "type")]
    kind: &'static str,

    /// The command line, including its terminator.
    payload: String,
}

impl TerminalInput {
    /// Creates an input frame for one command.
    #[must_use]
    pub fn command(command: &str) -> Self {
        Self {
            kind: "input",
            payload: format!("{command}\r"),
        }
    }

    /// Serializes the frame for transmission.
    ///
    /// # Errors
    ///
    /// [`Error::Json`](crate::Error::Json) on serialization failure.
    pub fn to_message(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Inbound Frames
// ============================================================================

/// Extracts the text payload from an inbound console frame.
///
/// # Errors
///
/// - [`Error::Json`](crate::Error::Json) if the frame is not JSON
/// - [`Error::Protocol`] if the frame has no text `payload` field
pub fn extract_payload(text: &str) -> Result<String> {
    let frame: Value = serde_json::from_str(text)?;
    frame
        .get("payload")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::protocol("console frame has no payload field"))
}

// ============================================================================
// Tests
// ============================================================================
