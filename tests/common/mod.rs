//! Shared utilities for transport integration tests.
//!
//! Provides a local WebSocket server whose behavior each test chooses.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing_subscriber::EnvFilter;

use ws_transport::{EventReceiver, TransportEvent};

/// Installs a test subscriber once. Controlled by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What the server does after the handshake.
#[derive(Debug, Clone)]
pub enum Mode {
    /// Echo text and binary frames, answer pings.
    Echo,
    /// Never read, so pings go unanswered.
    Mute,
    /// Close immediately with the given code and reason.
    Close(u16, &'static str),
    /// Send one binary frame, then echo.
    Binary,
    /// Echo, but answer the client's close frame only after a delay.
    SlowClose(Duration),
}

/// Handshake details seen by the server.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub protocols: Vec<String>,
    pub token: Option<String>,
}

/// Local WebSocket server for tests.
pub struct TestServer {
    pub addr: SocketAddr,
    handshakes: Arc<Mutex<Vec<Handshake>>>,
    shutdown: Arc<Notify>,
}

impl TestServer {
    /// Binds to a random local port and starts accepting.
    pub async fn start(mode: Mode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let handshakes = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(Notify::new());

        let accept_handshakes = Arc::clone(&handshakes);
        let accept_shutdown = Arc::clone(&shutdown);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { break };
                        let handshakes = Arc::clone(&accept_handshakes);
                        let shutdown = Arc::clone(&accept_shutdown);
                        let mode = mode.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, mode, handshakes, shutdown).await;
                        });
                    }
                    () = accept_shutdown.notified() => break,
                }
            }
        });

        Self {
            addr,
            handshakes,
            shutdown,
        }
    }

    /// Returns the `ws://` URL of this server.
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Returns every handshake accepted so far.
    pub fn handshakes(&self) -> Vec<Handshake> {
        self.handshakes.lock().clone()
    }

    /// Stops accepting and drops live connections.
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn handle_connection(
    stream: TcpStream,
    mode: Mode,
    handshakes: Arc<Mutex<Vec<Handshake>>>,
    shutdown: Arc<Notify>,
) {
    let callback = |request: &Request, mut response: Response| {
        let protocols: Vec<String> = request
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(',').map(|p| p.trim().to_string()).collect())
            .unwrap_or_default();

        let token = request
            .headers()
            .get("x-token")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        if let Some(first) = protocols.first()
            && let Ok(value) = HeaderValue::from_str(first)
        {
            response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        handshakes.lock().push(Handshake { protocols, token });
        Ok::<_, ErrorResponse>(response)
    };

    let Ok(ws_stream) = accept_hdr_async(stream, callback).await else {
        return;
    };

    let (mut write, mut read) = ws_stream.split();

    match mode {
        Mode::Mute => {
            shutdown.notified().await;
            return;
        }
        Mode::Close(code, reason) => {
            let frame = CloseFrame {
                code: CloseCode::from(code),
                reason: reason.to_string().into(),
            };
            let _ = write.send(Message::Close(Some(frame))).await;
            // Wait for the client's close reply.
            let _ = timeout(Duration::from_secs(2), read.next()).await;
            return;
        }
        Mode::Binary => {
            if write.send(Message::Binary(vec![0xde, 0xad].into())).await.is_err() {
                return;
            }
        }
        Mode::Echo | Mode::SlowClose(_) => {}
    }

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) if msg.is_text() || msg.is_binary() => {
                        if write.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if write.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        if let Mode::SlowClose(delay) = mode {
                            sleep(delay).await;
                            // Reading again flushes the queued close reply.
                            let _ = read.next().await;
                        }
                        break;
                    }
                    Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            () = shutdown.notified() => break,
        }
    }
}

/// Returns a local address nothing listens on.
pub async fn unused_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("ws://{addr}")
}

/// Waits for the next notification.
pub async fn next_event(rx: &mut EventReceiver) -> TransportEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("notification channel closed")
}

/// Waits until a notification matching `predicate` arrives.
pub async fn wait_for(
    rx: &mut EventReceiver,
    predicate: impl Fn(&TransportEvent) -> bool,
) -> TransportEvent {
    loop {
        let event = next_event(rx).await;
        if predicate(&event) {
            return event;
        }
    }
}
