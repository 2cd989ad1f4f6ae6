//! Native socket adapter over `tokio-tungstenite`.
//!
//! Each socket owns a spawned I/O task. The [`Socket`] handle talks to the
//! task through an unbounded command channel, and the task reports back
//! through the [`SocketEventSink`].
//!
//! # I/O Task
//!
//! ```text
//! ┌──────────────┐   SocketCommand    ┌──────────────────┐   WebSocket   ┌────────┐
//! │ NativeSocket │ ─────────────────► │   I/O task       │ ◄───────────► │ Server │
//! │ (handle)     │                    │ (tokio::spawn)   │               └────────┘
//! └──────────────┘                    └────────┬─────────┘
//!                                              │ SocketEvent
//!                                              ▼
//!                                        SocketEventSink
//! ```
//!
//! # Passthrough Options
//!
//! | Key | Type | Effect |
//! |-----|------|--------|
//! | `headers` | object of strings | Extra handshake request headers |
//! | `disable_nagle` | bool | Sets `TCP_NODELAY` on the stream |
//! | `close_timeout_ms` | positive integer | How long to wait for the peer's close reply, default 30000 |
//!
//! A socket whose peer never answers the close frame is dropped once the
//! close timeout passes and reports close code 1006.

// ============================================================================
// Imports
// ============================================================================

use std::future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};

use super::adapter::{
    CLOSE_ABNORMAL, CLOSE_NO_STATUS, PassthroughOptions, SharedPhase, Socket, SocketEvent,
    SocketEventSink, SocketFactory, SocketPayload, SocketPhase, SocketRequest,
};

// ============================================================================
// Types
// ============================================================================

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<Stream, Message>;
type WsRead = SplitStream<Stream>;

/// Default wait for the peer's close reply.
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// SocketCommand
// ============================================================================

/// Internal commands for the I/O task.
enum SocketCommand {
    /// Transmit a text frame.
    Send(String),
    /// Transmit a ping.
    Ping,
    /// Start the close handshake.
    Close { code: u16, reason: String },
    /// Drop the connection.
    Terminate,
}

// ============================================================================
// TungsteniteFactory
// ============================================================================

/// Factory for sockets backed by `tokio-tungstenite`.
///
/// Must be used from inside a Tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteFactory;

impl TungsteniteFactory {
    /// Creates a new factory.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SocketFactory for TungsteniteFactory {
    fn create(&self, request: &SocketRequest, sink: SocketEventSink) -> Result<Box<dyn Socket>> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::socket_creation(format!("no Tokio runtime: {e}")))?;

        let handshake = build_handshake(request)?;
        let disable_nagle = disable_nagle(&request.passthrough)?;
        let close_timeout = close_timeout(&request.passthrough)?;

        let phase = Arc::new(SharedPhase::new(SocketPhase::Connecting));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        debug!(
            socket_id = %sink.socket_id(),
            address = %request.address,
            "Opening WebSocket"
        );

        runtime.spawn(run_socket(
            handshake,
            disable_nagle,
            close_timeout,
            command_rx,
            Arc::clone(&phase),
            sink,
        ));

        Ok(Box::new(NativeSocket { command_tx, phase }))
    }
}

// ============================================================================
// Handshake
// ============================================================================

/// Builds the client handshake request.
fn build_handshake(request: &SocketRequest) -> Result<Request> {
    let mut handshake = request.address.as_str().into_client_request()?;

    if !request.subprotocols.is_empty() {
        let value = HeaderValue::from_str(&request.subprotocols.join(", "))
            .map_err(|e| Error::invalid_argument(format!("invalid subprotocol: {e}")))?;
        handshake.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }

    match request.passthrough.get("headers") {
        None | Some(Value::Null) => {}
        Some(Value::Object(headers)) => {
            for (name, value) in headers {
                let Value::String(value) = value else {
                    return Err(Error::invalid_argument(format!(
                        "header {name} must be a string"
                    )));
                };
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| Error::invalid_argument(format!("invalid header name: {e}")))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| Error::invalid_argument(format!("invalid header value: {e}")))?;
                handshake.headers_mut().insert(name, value);
            }
        }
        Some(_) => {
            return Err(Error::invalid_argument(
                "passthrough option `headers` must be an object",
            ));
        }
    }

    Ok(handshake)
}

/// Reads the `disable_nagle` passthrough option.
fn disable_nagle(passthrough: &PassthroughOptions) -> Result<bool> {
    match passthrough.get("disable_nagle") {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(_) => Err(Error::invalid_argument(
            "passthrough option `disable_nagle` must be a bool",
        )),
    }
}

/// Reads the `close_timeout_ms` passthrough option.
fn close_timeout(passthrough: &PassthroughOptions) -> Result<Duration> {
    match passthrough.get("close_timeout_ms") {
        None | Some(Value::Null) => Ok(DEFAULT_CLOSE_TIMEOUT),
        Some(value) => value
            .as_u64()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .ok_or_else(|| {
                Error::invalid_argument(
                    "passthrough option `close_timeout_ms` must be a positive integer",
                )
            }),
    }
}

// ============================================================================
// NativeSocket
// ============================================================================

/// Handle to a socket driven by an I/O task.
struct NativeSocket {
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    phase: Arc<SharedPhase>,
}

impl NativeSocket {
    fn command(&self, command: SocketCommand) {
        if self.command_tx.send(command).is_err() {
            trace!("Socket task already finished");
        }
    }
}

impl Socket for NativeSocket {
    fn phase(&self) -> SocketPhase {
        self.phase.get()
    }

    fn send(&mut self, frame: String) {
        self.command(SocketCommand::Send(frame));
    }

    fn ping(&mut self) {
        self.command(SocketCommand::Ping);
    }

    fn close(&mut self, code: u16, reason: &str) {
        if self.phase.begin_closing() {
            self.command(SocketCommand::Close {
                code,
                reason: reason.to_owned(),
            });
        }
    }

    fn terminate(&mut self) {
        self.command(SocketCommand::Terminate);
    }
}

// ============================================================================
// I/O Task
// ============================================================================

/// Runs one socket from handshake to close.
async fn run_socket(
    handshake: Request,
    disable_nagle: bool,
    close_timeout: Duration,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    phase: Arc<SharedPhase>,
    sink: SocketEventSink,
) {
    let socket_id = sink.socket_id();

    let connect = connect_async_with_config(handshake, None, disable_nagle);
    tokio::pin!(connect);

    // The handshake cannot be cancelled by `close`, only by `terminate`.
    let mut pending_close = None;
    let stream = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((stream, _response)) => break stream,
                Err(e) => {
                    warn!(%socket_id, error = %e, "WebSocket handshake failed");
                    phase.set(SocketPhase::Closed);
                    sink.emit(SocketEvent::Error(e.to_string()));
                    emit_close(&sink, CLOSE_ABNORMAL, String::new());
                    return;
                }
            },
            command = command_rx.recv() => match command {
                Some(SocketCommand::Terminate) | None => {
                    debug!(%socket_id, "Handshake abandoned");
                    phase.set(SocketPhase::Closed);
                    emit_close(&sink, CLOSE_ABNORMAL, String::new());
                    return;
                }
                Some(SocketCommand::Close { code, reason }) => {
                    pending_close = Some((code, reason));
                }
                Some(_) => trace!(%socket_id, "Command ignored during handshake"),
            },
        }
    };

    // A close requested mid-handshake already moved the phase to Closing.
    phase.mark_open();
    info!(%socket_id, "WebSocket connection established");
    sink.emit(SocketEvent::Open);

    let (mut ws_write, mut ws_read) = stream.split();
    let mut close_deadline = None;
    if let Some((code, reason)) = pending_close {
        send_close(&mut ws_write, code, reason, &sink).await;
        close_deadline = Some(Instant::now() + close_timeout);
    }

    let mut io = SocketIo {
        ws_write: &mut ws_write,
        ws_read: &mut ws_read,
        command_rx: &mut command_rx,
        close_timeout,
        close_deadline,
    };
    let (code, reason) = run_event_loop(&mut io, &phase, &sink).await;

    phase.set(SocketPhase::Closed);
    emit_close(&sink, code, reason);
    debug!(%socket_id, code, "Socket task terminated");
}

/// Stream halves and close bookkeeping of an established socket.
struct SocketIo<'a> {
    ws_write: &'a mut WsWrite,
    ws_read: &'a mut WsRead,
    command_rx: &'a mut mpsc::UnboundedReceiver<SocketCommand>,
    close_timeout: Duration,
    /// Set once our close frame is out.
    close_deadline: Option<Instant>,
}

/// Pumps frames and commands until the connection ends.
///
/// Returns the close code and reason to report.
async fn run_event_loop(
    io: &mut SocketIo<'_>,
    phase: &SharedPhase,
    sink: &SocketEventSink,
) -> (u16, String) {
    let socket_id = sink.socket_id();
    let mut received_close: Option<(u16, String)> = None;

    loop {
        let ws_write = &mut *io.ws_write;

        tokio::select! {
            message = io.ws_read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    sink.emit(SocketEvent::Message(SocketPayload::Text(text.as_str().to_owned())));
                }
                Some(Ok(Message::Binary(data))) => {
                    sink.emit(SocketEvent::Message(SocketPayload::Binary(data.to_vec())));
                }
                Some(Ok(Message::Pong(_))) => sink.emit(SocketEvent::Pong),
                Some(Ok(Message::Close(frame))) => {
                    phase.begin_closing();
                    received_close = Some(match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.to_string()),
                        None => (CLOSE_NO_STATUS, String::new()),
                    });
                    debug!(%socket_id, "Close frame received");
                }
                // Pings are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(%socket_id, error = %e, "WebSocket error");
                    sink.emit(SocketEvent::Error(e.to_string()));
                    return received_close.unwrap_or((CLOSE_ABNORMAL, String::new()));
                }
                None => {
                    debug!(%socket_id, "WebSocket stream ended");
                    return received_close.unwrap_or((CLOSE_ABNORMAL, String::new()));
                }
            },

            command = io.command_rx.recv() => match command {
                Some(SocketCommand::Send(frame)) => {
                    let result = ws_write
                        .send(Message::Text(frame.into()))
                        .await
                        .map_err(|e| e.to_string());
                    trace!(%socket_id, ok = result.is_ok(), "Frame sent");
                    sink.emit(SocketEvent::Sent(result));
                }
                Some(SocketCommand::Ping) => {
                    let result = ws_write
                        .send(Message::Ping(Default::default()))
                        .await
                        .map_err(|e| e.to_string());
                    sink.emit(SocketEvent::PingSent(result));
                }
                Some(SocketCommand::Close { code, reason }) => {
                    send_close(ws_write, code, reason, sink).await;
                    io.close_deadline = Some(Instant::now() + io.close_timeout);
                }
                Some(SocketCommand::Terminate) | None => {
                    debug!(%socket_id, "Socket terminated");
                    return (CLOSE_ABNORMAL, String::new());
                }
            },

            () = sleep_until_close(io.close_deadline) => {
                warn!(%socket_id, "Peer never answered the close frame");
                return (CLOSE_ABNORMAL, String::new());
            }
        }
    }
}

async fn sleep_until_close(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

async fn send_close(ws_write: &mut WsWrite, code: u16, reason: String, sink: &SocketEventSink) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    };
    if let Err(e) = ws_write.send(Message::Close(Some(frame))).await {
        debug!(socket_id = %sink.socket_id(), error = %e, "Close frame not sent");
    }
}

fn emit_close(sink: &SocketEventSink, code: u16, reason: String) {
    sink.emit(SocketEvent::Close { code, reason });
}

// ============================================================================
// Tests
// ============================================================================
