//! Test-only local servers.
//!
//! Small stand-ins for the pieces of the cloud this crate talks to: a
//! WebSocket feed that plays the notification service, a WebSocket shell
//! that plays a device console, and a canned-response HTTP listener for
//! control-plane calls. All bind to an ephemeral loopback port and run
//! until the test runtime shuts down.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use url::Url;

// ============================================================================
// Tracing
// ============================================================================

/// Routes crate logs to the test harness when `RUST_LOG` asks for them.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// Notification Feed
// ============================================================================

/// A local WebSocket service pushing canned notification envelopes.
pub struct WsFeed {
    /// Streaming URL to hand to the code under test.
    pub url: Url,
    /// Number of connections accepted so far.
    pub connections: Arc<AtomicUsize>,
    /// `Sec-WebSocket-Protocol` header values seen at handshake.
    pub subprotocols: Arc<Mutex<Vec<String>>>,
}

/// Starts a feed that sends `frames` to every accepted connection.
///
/// With `close_after_send` the server closes each connection once its
/// frames are out, which forces the client into its reconnect path;
/// otherwise the connection is held open until the client closes.
pub async fn notification_feed(frames: Vec<String>, close_after_send: bool) -> WsFeed {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind feed");
    let addr = listener.local_addr().expect("feed addr");
    let url = Url::parse(&format!("ws://{addr}/v2/notification/websocket-connect"))
        .expect("feed url");

    let connections = Arc::new(AtomicUsize::new(0));
    let subprotocols = Arc::new(Mutex::new(Vec::new()));

    let accepted = Arc::clone(&connections);
    let recorded = Arc::clone(&subprotocols);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            accepted.fetch_add(1, Ordering::SeqCst);

            let frames = frames.clone();
            let recorded = Arc::clone(&recorded);
            tokio::spawn(async move {
                let Ok(mut ws) = accept_recording_subprotocol(stream, &recorded).await else {
                    return;
                };
                for frame in frames {
                    if ws.send(Message::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
                if close_after_send {
                    let _ = ws.close(None).await;
                } else {
                    while let Some(Ok(_)) = ws.next().await {}
                }
            });
        }
    });

    WsFeed {
        url,
        connections,
        subprotocols,
    }
}

/// Accepts a handshake, recording the offered sub-protocols and echoing
/// the first one back, as the real service does.
async fn accept_recording_subprotocol(
    stream: TcpStream,
    recorded: &Mutex<Vec<String>>,
) -> std::result::Result<WebSocketStream<TcpStream>, tokio_tungstenite::tungstenite::Error> {
    let callback = |request: &Request, mut response: Response| -> std::result::Result<Response, ErrorResponse> {
        if let Some(header) = request.headers().get("Sec-WebSocket-Protocol") {
            let offered = header.to_str().unwrap_or_default().to_string();
            let first = offered
                .split(',')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            recorded.lock().push(offered);
            if let Ok(value) = first.parse() {
                response
                    .headers_mut()
                    .append("Sec-WebSocket-Protocol", value);
            }
        }
        Ok(response)
    };
    accept_hdr_async(stream, callback).await
}

// ============================================================================
// Terminal Shell
// ============================================================================

/// A local WebSocket service playing a device console.
pub struct TerminalMock {
    /// Console URL to hand to the code under test.
    pub url: Url,
    /// Raw input frames received from the client.
    pub inputs: Arc<Mutex<Vec<String>>>,
    /// `Sec-WebSocket-Protocol` header values seen at handshake.
    pub subprotocols: Arc<Mutex<Vec<String>>>,
}

/// Starts a console that greets with a prompt frame, waits for one input
/// frame, then sends `reply_frames` verbatim.
///
/// Reply frames are raw JSON text so tests can also send malformed ones.
pub async fn terminal_mock(prompt: String, reply_frames: Vec<String>) -> TerminalMock {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind console");
    let addr = listener.local_addr().expect("console addr");
    let url = Url::parse(&format!("ws://{addr}/v3alpha/devices/test/console"))
        .expect("console url");

    let inputs = Arc::new(Mutex::new(Vec::new()));
    let subprotocols = Arc::new(Mutex::new(Vec::new()));

    let received = Arc::clone(&inputs);
    let recorded = Arc::clone(&subprotocols);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };

            let prompt = prompt.clone();
            let reply_frames = reply_frames.clone();
            let received = Arc::clone(&received);
            let recorded = Arc::clone(&recorded);
            tokio::spawn(async move {
                let Ok(mut ws) = accept_recording_subprotocol(stream, &recorded).await else {
                    return;
                };

                let greeting = json!({ "payload": prompt }).to_string();
                if ws.send(Message::Text(greeting.into())).await.is_err() {
                    return;
                }

                while let Some(Ok(message)) = ws.next().await {
                    if let Message::Text(text) = message {
                        received.lock().push(text.to_string());
                        break;
                    }
                }

                for frame in reply_frames {
                    if ws.send(Message::Text(frame.into())).await.is_err() {
                        return;
                    }
                }
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    TerminalMock {
        url,
        inputs,
        subprotocols,
    }
}

// ============================================================================
// HTTP Mock
// ============================================================================

/// One recorded HTTP request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request line and headers.
    pub head: String,
    /// Request body, if any.
    pub body: String,
}

impl RecordedRequest {
    /// Returns the request line (e.g., "PUT /v2/notification/websocket HTTP/1.1").
    #[must_use]
    pub fn line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    /// Returns `true` if a header line contains `needle`, case-insensitively.
    #[must_use]
    pub fn has_header(&self, needle: &str) -> bool {
        let needle = needle.to_ascii_lowercase();
        self.head
            .lines()
            .any(|line| line.to_ascii_lowercase().contains(&needle))
    }
}

/// A local HTTP listener answering every request with one canned response.
pub struct HttpMock {
    /// Base URL to hand to the code under test.
    pub url: Url,
    /// Listener address, for building non-HTTP URLs against the same port.
    pub addr: SocketAddr,
    /// Number of connections accepted so far.
    pub hits: Arc<AtomicUsize>,
    /// Requests received, in order.
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

/// Starts an HTTP listener answering with `status` and `body`.
pub async fn http_mock(status: u16, body: &str) -> HttpMock {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind http");
    let addr = listener.local_addr().expect("http addr");
    let url = Url::parse(&format!("http://{addr}")).expect("http url");

    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let body = body.to_string();

    let accepted = Arc::clone(&hits);
    let recorded = Arc::clone(&requests);
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            accepted.fetch_add(1, Ordering::SeqCst);

            let body = body.clone();
            let recorded = Arc::clone(&recorded);
            tokio::spawn(async move {
                if let Some(request) = read_request(&mut stream).await {
                    recorded.lock().push(request);
                }
                let response = format!(
                    "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    reason(status),
                    body.len(),
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.flush().await;
            });
        }
    });

    HttpMock {
        url,
        addr,
        hits,
        requests,
    }
}

/// Reads one HTTP request (head + content-length body) off a stream.
async fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut data = Vec::new();
    let mut buf = [0u8; 1024];

    let header_end = loop {
        let n = stream.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = find_subsequence(&data, b"\r\n\r\n") {
            break pos + 4;
        }
        if data.len() > 64 * 1024 {
            return None;
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }

    Some(RecordedRequest {
        head,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

/// Reason phrases for the statuses these tests use.
fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
