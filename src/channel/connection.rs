//! Streaming connection to the notification service.
//!
//! A [`Connection`] keeps one socket alive for the lifetime of a channel
//! and feeds every parsed envelope into the channel's [`EventStore`]. Two
//! background tasks do the work:
//!
//! - the **network loop** connects (authenticating through the
//!   `Sec-WebSocket-Protocol` credential token), reads frames, and
//!   reconnects after a short backoff whenever the socket drops;
//! - the **classification loop** drains a bounded queue of decoded
//!   envelopes into the store, so a slow classification never stalls
//!   socket reads for long and a burst of pushes never grows unbounded.
//!
//! Socket-level failures are contained here: they are logged and answered
//! with a reconnect, never surfaced to waiting test code. The one
//! exception is a credential rejection at handshake, which is terminal —
//! retrying with the same key cannot succeed.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::ApiKey;
use crate::protocol::envelope::NotificationEnvelope;
use crate::store::EventStore;

// ============================================================================
// Constants
// ============================================================================

/// Pause between reconnect attempts after a socket failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Envelopes buffered between the network and classification loops.
const INGRESS_QUEUE_CAPACITY: usize = 256;

/// A client-side socket, TLS or plain.
type SocketStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// SocketState
// ============================================================================

/// Lifecycle state of the streaming connection.
///
/// Starts at `Closed`, moves to `Open` on [`Connection::open`], passes
/// through `Closing` while a deliberate shutdown drains the loops, and
/// returns to `Closed` when the network loop exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Loops running; the socket is up or being re-established.
    Open,
    /// Shutdown requested; loops are winding down.
    Closing,
    /// No loops running.
    Closed,
}

// ============================================================================
// Connection
// ============================================================================

/// Shared state consulted by both background loops.
#[derive(Debug)]
struct ConnectionShared {
    /// Streaming endpoint URL.
    url: Url,
    /// Credential embedded in the handshake.
    api_key: ApiKey,
    /// Destination for classified events.
    store: Arc<EventStore>,
    /// Lifecycle state, the single source of truth for both loops.
    state: Mutex<SocketState>,
    /// Wakes the network loop out of connect/read/backoff awaits.
    closer: Notify,
    /// Set when the service rejected the credential.
    auth_failed: AtomicBool,
}

impl ConnectionShared {
    fn state(&self) -> SocketState {
        *self.state.lock()
    }

    fn set_state(&self, next: SocketState) {
        *self.state.lock() = next;
    }
}

/// Maintains a live streaming connection to the notification service.
///
/// Created by the channel lifecycle manager; owns exactly one socket at a
/// time. `open()` is idempotent and `close()` is safe in any state.
#[derive(Debug)]
pub struct Connection {
    shared: Arc<ConnectionShared>,
    /// Handles of the spawned loops, aborted on drop.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    /// Creates a connection in the `Closed` state.
    ///
    /// Nothing touches the network until [`open`](Self::open).
    #[must_use]
    pub fn new(url: Url, api_key: ApiKey, store: Arc<EventStore>) -> Self {
        Self {
            shared: Arc::new(ConnectionShared {
                url,
                api_key,
                store,
                state: Mutex::new(SocketState::Closed),
                closer: Notify::new(),
                auth_failed: AtomicBool::new(false),
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the network and classification loops.
    ///
    /// Idempotent: when the connection is already open, or still winding
    /// down from a close, this logs and returns without creating a second
    /// socket. Must be called from within a Tokio runtime.
    pub fn open(&self) {
        {
            let mut state = self.shared.state.lock();
            match *state {
                SocketState::Open => {
                    warn!("notification socket already running");
                    return;
                }
                SocketState::Closing => {
                    warn!("notification socket still closing, open ignored");
                    return;
                }
                SocketState::Closed => *state = SocketState::Open,
            }
        }
        self.shared.auth_failed.store(false, Ordering::SeqCst);
        info!(url = %self.shared.url, "opening notification socket");

        let (envelope_tx, envelope_rx) = mpsc::channel(INGRESS_QUEUE_CAPACITY);
        let network = tokio::spawn(Self::network_loop(
            Arc::clone(&self.shared),
            envelope_tx,
        ));
        let classification = tokio::spawn(Self::classification_loop(
            Arc::clone(&self.shared),
            envelope_rx,
        ));
        self.tasks.lock().extend([network, classification]);
    }

    /// Requests shutdown of both loops.
    ///
    /// Marks the intent to close first so the network loop can tell a
    /// deliberate close from a failure and will not reconnect. Safe to
    /// call in any state, including before [`open`](Self::open) and
    /// repeatedly.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            match *state {
                SocketState::Open => *state = SocketState::Closing,
                SocketState::Closing | SocketState::Closed => {
                    debug!("notification socket not running");
                    return;
                }
            }
        }
        info!("closing notification socket");
        self.shared.closer.notify_one();
    }

    /// Returns the current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SocketState {
        self.shared.state()
    }

    /// Returns `true` while the loops are running.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == SocketState::Open
    }

    /// Returns `true` once the service has rejected the credential.
    ///
    /// A rejected credential stops the reconnect loop for good; waits
    /// against this channel will only ever time out afterwards.
    #[inline]
    #[must_use]
    pub fn auth_failed(&self) -> bool {
        self.shared.auth_failed.load(Ordering::SeqCst)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

// ============================================================================
// Network Loop
// ============================================================================

/// Why a read session ended.
enum Disconnect {
    /// `close()` was called.
    Requested,
    /// The server closed or the socket failed.
    Remote,
}

impl Connection {
    /// Connect-read-reconnect loop.
    async fn network_loop(
        shared: Arc<ConnectionShared>,
        envelopes: mpsc::Sender<NotificationEnvelope>,
    ) {
        'session: loop {
            if shared.state() != SocketState::Open {
                break;
            }

            let connected = tokio::select! {
                result = Self::connect_socket(&shared.url, &shared.api_key) => result,
                _ = shared.closer.notified() => break 'session,
            };

            let mut ws = match connected {
                Ok(ws) => {
                    info!(url = %shared.url, "notification socket connected");
                    ws
                }
                Err(err) if err.is_auth_failure() => {
                    error!(error = %err, "notification socket unauthorized, giving up");
                    shared.auth_failed.store(true, Ordering::SeqCst);
                    break 'session;
                }
                Err(err) => {
                    warn!(error = %err, "notification socket connect failed");
                    if !Self::reconnect_backoff(&shared).await {
                        break 'session;
                    }
                    continue 'session;
                }
            };

            match Self::read_frames(&shared, &mut ws, &envelopes).await {
                Disconnect::Requested => {
                    let _ = ws.close(None).await;
                    break 'session;
                }
                Disconnect::Remote => {
                    if shared.state() != SocketState::Open {
                        break 'session;
                    }
                    warn!("notification socket lost, reconnecting");
                    if !Self::reconnect_backoff(&shared).await {
                        break 'session;
                    }
                }
            }
        }

        shared.set_state(SocketState::Closed);
        debug!("notification network loop terminated");
    }

    /// Performs the handshake with the credential sub-protocols.
    async fn connect_socket(url: &Url, api_key: &ApiKey) -> Result<SocketStream> {
        let mut request = url.as_str().into_client_request()?;
        let protocols: HeaderValue = format!("wss, {}", api_key.subprotocol())
            .parse()
            .map_err(|_| Error::connection("api key is not valid in a header"))?;
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, protocols);

        let (ws, response) = connect_async(request).await.map_err(Error::from_handshake)?;
        debug!(status = %response.status(), "notification handshake complete");
        Ok(ws)
    }

    /// Reads frames until shutdown, server close, or socket failure.
    async fn read_frames(
        shared: &ConnectionShared,
        ws: &mut SocketStream,
        envelopes: &mpsc::Sender<NotificationEnvelope>,
    ) -> Disconnect {
        loop {
            tokio::select! {
                message = ws.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            match NotificationEnvelope::parse(&text) {
                                Ok(envelope) => {
                                    if envelopes.send(envelope).await.is_err() {
                                        debug!("classification loop gone, stopping reads");
                                        return Disconnect::Requested;
                                    }
                                }
                                Err(err) => {
                                    warn!(error = %err, "dropping malformed notification frame");
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("notification socket closed by server");
                            return Disconnect::Remote;
                        }

                        Some(Err(err)) => {
                            warn!(error = %err, "notification socket error");
                            return Disconnect::Remote;
                        }

                        None => {
                            debug!("notification stream ended");
                            return Disconnect::Remote;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                _ = shared.closer.notified() => {
                    debug!("close requested, leaving read loop");
                    return Disconnect::Requested;
                }
            }
        }
    }

    /// Sleeps out the reconnect delay; `false` when close interrupted it.
    async fn reconnect_backoff(shared: &ConnectionShared) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => true,
            _ = shared.closer.notified() => false,
        }
    }
}

// ============================================================================
// Classification Loop
// ============================================================================

impl Connection {
    /// Single consumer draining decoded envelopes into the store.
    async fn classification_loop(
        shared: Arc<ConnectionShared>,
        mut envelopes: mpsc::Receiver<NotificationEnvelope>,
    ) {
        while let Some(envelope) = envelopes.recv().await {
            shared.store.ingest(envelope);
        }
        debug!("classification loop terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================
