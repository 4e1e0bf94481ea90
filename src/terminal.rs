//! Remote terminal access to gateway devices.
//!
//! Gateways expose a console over a dedicated socket endpoint. The
//! exchange is line-oriented: the console greets with its shell prompt,
//! [`RemoteTerminal`] sends the command as an input frame, then collects
//! output frames until the prompt appears again, which marks the command
//! as finished. The echoed command and the prompt are stripped from the
//! transcript before it is returned.
//!
//! Each [`execute`](RemoteTerminal::execute) call opens a fresh
//! connection and closes it when done, so commands never see each
//! other's leftover output.
//!
//! # Example
//!
//! ```no_run
//! use pelion_systest::{CloudConfig, DeviceId, RemoteTerminal};
//!
//! # async fn example() -> pelion_systest::Result<()> {
//! let config = CloudConfig::from_env()?;
//! let device = DeviceId::new("0161661e9ce1000000000001001002b5");
//!
//! let terminal = RemoteTerminal::new(&config, &device);
//! let kernel = terminal.execute("uname -r").await?;
//! println!("gateway kernel: {kernel}");
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use regex::Regex;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};
use url::Url;

use crate::config::CloudConfig;
use crate::error::{Error, Result};
use crate::identifiers::{ApiKey, DeviceId};
use crate::protocol::terminal::{TerminalInput, extract_payload};

// ============================================================================
// Constants
// ============================================================================

/// Deadline for a single console frame unless overridden.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a whole command unless overridden.
const DEFAULT_EXECUTE_TIMEOUT: Duration = Duration::from_secs(60);

/// ANSI escape sequences, colors and cursor movement alike.
static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[a-zA-Z]").unwrap());

/// A client-side console socket.
type TerminalStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// RemoteTerminal
// ============================================================================

/// Client for a device's remote console.
#[derive(Debug, Clone)]
pub struct RemoteTerminal {
    url: Url,
    api_key: ApiKey,
    read_timeout: Duration,
    execute_timeout: Duration,
}

// ============================================================================
// Constructors
// ============================================================================

impl RemoteTerminal {
    /// Creates a terminal for a device reachable through `config`.
    #[must_use]
    pub fn new(config: &CloudConfig, device: &DeviceId) -> Self {
        Self::with_url(config.console_url(device), config.api_key().clone())
    }

    /// Creates a terminal against an explicit console URL.
    #[must_use]
    pub fn with_url(url: Url, api_key: ApiKey) -> Self {
        Self {
            url,
            api_key,
            read_timeout: DEFAULT_READ_TIMEOUT,
            execute_timeout: DEFAULT_EXECUTE_TIMEOUT,
        }
    }

    /// Overrides the per-frame read deadline.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Overrides the whole-command deadline.
    #[must_use]
    pub fn with_execute_timeout(mut self, timeout: Duration) -> Self {
        self.execute_timeout = timeout;
        self
    }
}

// ============================================================================
// Command Execution
// ============================================================================

impl RemoteTerminal {
    /// Runs `command` on the device and returns its cleaned output.
    ///
    /// # Errors
    ///
    /// - [`Error::TerminalTooSlow`] when the device stops answering or
    ///   the command overruns the deadline
    /// - [`Error::Unauthorized`] when the console rejects the key
    /// - [`Error::Terminal`] and [`Error::Protocol`] for console frames
    ///   this client cannot make sense of
    pub async fn execute(&self, command: &str) -> Result<String> {
        self.execute_with_timeout(command, self.execute_timeout)
            .await
    }

    /// Runs `command` with an explicit whole-command deadline.
    pub async fn execute_with_timeout(&self, command: &str, timeout: Duration) -> Result<String> {
        info!(command, "executing remote terminal command");
        match tokio::time::timeout(timeout, self.execute_inner(command)).await {
            Ok(result) => result,
            Err(_) => Err(Error::terminal_too_slow(timeout)),
        }
    }

    /// One connect-execute-close cycle.
    async fn execute_inner(&self, command: &str) -> Result<String> {
        let mut ws = self.connect().await?;
        let result = self.run_command(&mut ws, command).await;
        if let Err(err) = ws.close(None).await {
            debug!(error = %err, "console close failed");
        }
        result
    }

    /// Opens the console socket with the credential sub-protocol.
    async fn connect(&self) -> Result<TerminalStream> {
        debug!(url = %self.url, "opening remote terminal");
        let mut request = self.url.as_str().into_client_request()?;
        let protocol: HeaderValue = self
            .api_key
            .subprotocol()
            .parse()
            .map_err(|_| Error::terminal("api key is not valid in a header"))?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, protocol);

        let (ws, _) = connect_async(request).await.map_err(Error::from_handshake)?;
        Ok(ws)
    }

    /// Drives the prompt/input/output exchange for one command.
    async fn run_command(&self, ws: &mut TerminalStream, command: &str) -> Result<String> {
        // The greeting is the shell prompt; seeing it again later marks
        // the end of the command's output.
        let sentinel = self.read_payload(ws).await?;
        debug!(prompt = %sentinel.trim(), "console prompt captured");

        let frame = TerminalInput::command(command).to_message()?;
        ws.send(Message::Text(frame.into())).await?;

        let mut transcript = String::new();
        loop {
            transcript.push_str(&self.read_payload(ws).await?);
            if transcript.contains(&sentinel) {
                break;
            }
        }
        debug!(bytes = transcript.len(), "console output complete");

        let cleaned = transcript.replace(command, "").replace(&sentinel, "");
        Ok(cleaned.trim().to_string())
    }

    /// Reads the next console payload within the read deadline.
    async fn read_payload(&self, ws: &mut TerminalStream) -> Result<String> {
        loop {
            let frame = tokio::time::timeout(self.read_timeout, ws.next())
                .await
                .map_err(|_| Error::terminal_too_slow(self.read_timeout))?;

            match frame {
                Some(Ok(Message::Text(text))) => return extract_payload(&text),
                Some(Ok(Message::Close(_))) | None => {
                    return Err(Error::terminal("console closed before the command finished"));
                }
                Some(Err(err)) => return Err(err.into()),
                // Ignore Binary, Ping, Pong
                Some(Ok(_)) => {}
            }
        }
    }
}

// ============================================================================
// Output Cleanup
// ============================================================================

/// Removes ANSI escape sequences from console output.
///
/// Shells dress their output in colors and cursor movement; assertions
/// want the bare text.
#[must_use]
pub fn strip_ansi_escapes(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use url::Url;

    use crate::testutil::{http_mock, terminal_mock};

    fn fast_terminal(url: Url) -> RemoteTerminal {
        RemoteTerminal::with_url(url, ApiKey::new("ak_test"))
            .with_read_timeout(Duration::from_millis(500))
    }

    fn output_frame(payload: &str) -> String {
        json!({ "type": "output", "payload": payload }).to_string()
    }

    #[tokio::test]
    async fn test_execute_returns_cleaned_output() {
        let prompt = "user@gateway:~$ ";
        let mock = terminal_mock(
            prompt.to_string(),
            vec![output_frame("echo hello\r\nhello\r\nuser@gateway:~$ ")],
        )
        .await;
        let terminal = fast_terminal(mock.url.clone());

        let output = terminal.execute("echo hello").await.unwrap();
        assert_eq!(output, "hello");
    }

    #[tokio::test]
    async fn test_output_split_across_frames() {
        let prompt = "$ ";
        let mock = terminal_mock(
            prompt.to_string(),
            vec![
                output_frame("ec"),
                output_frame("ho hi\r\nhi\r\n"),
                output_frame("$ "),
            ],
        )
        .await;
        let terminal = fast_terminal(mock.url.clone());

        let output = terminal.execute("echo hi").await.unwrap();
        assert_eq!(output, "hi");
    }

    #[tokio::test]
    async fn test_input_frame_shape_and_subprotocol() {
        let prompt = "$ ";
        let mock = terminal_mock(prompt.to_string(), vec![output_frame("$ ")]).await;
        let terminal = fast_terminal(mock.url.clone());

        terminal.execute("reboot").await.unwrap();

        let inputs = mock.inputs.lock().clone();
        assert_eq!(inputs, vec![r#"{"type":"input","payload":"reboot\r"}"#]);

        let protocols = mock.subprotocols.lock().clone();
        assert_eq!(protocols, vec!["pelion_ak_test".to_string()]);
    }

    #[tokio::test]
    async fn test_silent_console_is_too_slow() {
        let mock = terminal_mock("$ ".to_string(), Vec::new()).await;
        let terminal =
            fast_terminal(mock.url.clone()).with_read_timeout(Duration::from_millis(100));

        let err = terminal.execute("ls").await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_command_deadline_cuts_execution() {
        let mock = terminal_mock("$ ".to_string(), Vec::new()).await;
        let terminal = RemoteTerminal::with_url(mock.url.clone(), ApiKey::new("ak_test"));

        let err = terminal
            .execute_with_timeout("sleep 600", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_frame_without_payload_is_rejected() {
        let mock = terminal_mock("$ ".to_string(), vec![r#"{"type":"resize"}"#.to_string()]).await;
        let terminal = fast_terminal(mock.url.clone());

        let err = terminal.execute("ls").await.unwrap_err();
        assert!(err.to_string().contains("payload"));
    }

    #[tokio::test]
    async fn test_unauthorized_console() {
        let mock = http_mock(401, "").await;
        let url = Url::parse(&format!("ws://{}", mock.addr)).unwrap();
        let terminal = RemoteTerminal::with_url(url, ApiKey::new("ak_expired"));

        let err = terminal.execute("ls").await.unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[test]
    fn test_strip_ansi_escapes() {
        assert_eq!(
            strip_ansi_escapes("\x1b[31mred\x1b[0m plain"),
            "red plain"
        );
        assert_eq!(strip_ansi_escapes("\x1b[2J\x1b[Hcleared"), "cleared");
        assert_eq!(strip_ansi_escapes("untouched"), "untouched");
    }
}
