//! Socket Adapter contract.
//!
//! A socket is a single WebSocket connection attempt. It cannot be
//! reconnected once it begins closing; the transport creates a fresh one
//! through a [`SocketFactory`] for every attempt.
//!
//! # Notifications
//!
//! Sockets never call back into the transport. They push [`SocketEvent`]s
//! into a [`SocketEventSink`], which tags each event with the socket's
//! [`SocketId`]. Completions of [`Socket::send`] and [`Socket::ping`] travel
//! through the same sink, so they are ordered with every other notification.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::trace;
use url::Url;

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close frame carried no status code.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

// ============================================================================
// Types
// ============================================================================

/// Opaque options forwarded to the socket factory.
pub type PassthroughOptions = Map<String, Value>;

/// Receiving end of the socket event channel.
pub type SocketEventReceiver = mpsc::UnboundedReceiver<SocketEnvelope>;

// ============================================================================
// SocketId
// ============================================================================

/// Identity of one created socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(u64);

impl SocketId {
    /// Creates a socket ID from a raw counter value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw counter value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "socket-{}", self.0)
    }
}

// ============================================================================
// SocketPhase
// ============================================================================

/// Lifecycle phase of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SocketPhase {
    /// Handshake in flight.
    Connecting = 0,
    /// Handshake complete, frames may flow.
    Open = 1,
    /// Close handshake started.
    Closing = 2,
    /// Fully closed.
    Closed = 3,
}

impl SocketPhase {
    #[inline]
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for SocketPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Phase cell shared between a socket handle and its I/O task.
#[derive(Debug)]
pub struct SharedPhase(AtomicU8);

impl SharedPhase {
    /// Creates a cell holding `phase`.
    #[must_use]
    pub const fn new(phase: SocketPhase) -> Self {
        Self(AtomicU8::new(phase as u8))
    }

    /// Returns the current phase.
    #[inline]
    pub fn get(&self) -> SocketPhase {
        SocketPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Stores a new phase.
    #[inline]
    pub fn set(&self, phase: SocketPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }

    /// Moves from `Connecting` to `Open`.
    ///
    /// Returns `false` if a close was already requested.
    pub fn mark_open(&self) -> bool {
        self.0
            .compare_exchange(
                SocketPhase::Connecting as u8,
                SocketPhase::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Moves to `Closing` unless the socket is already closing or closed.
    ///
    /// Returns `true` if the phase changed.
    pub fn begin_closing(&self) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                match SocketPhase::from_u8(raw) {
                    SocketPhase::Connecting | SocketPhase::Open => {
                        Some(SocketPhase::Closing as u8)
                    }
                    _ => None,
                }
            })
            .is_ok()
    }
}

// ============================================================================
// SocketPayload / SocketEvent
// ============================================================================

/// Payload of an inbound data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketPayload {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

/// Notification emitted by a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Handshake completed.
    Open,
    /// Data frame received.
    Message(SocketPayload),
    /// Pong frame received.
    Pong,
    /// Socket fully closed.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// Diagnostic error. Always followed by `Close` when it matters.
    Error(String),
    /// Completion of [`Socket::send`].
    Sent(std::result::Result<(), String>),
    /// Completion of [`Socket::ping`].
    PingSent(std::result::Result<(), String>),
}

/// A socket event tagged with the socket that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEnvelope {
    /// Producing socket.
    pub socket_id: SocketId,
    /// The notification.
    pub event: SocketEvent,
}

// ============================================================================
// SocketEventSink
// ============================================================================

/// Sender half handed to each created socket.
#[derive(Debug, Clone)]
pub struct SocketEventSink {
    socket_id: SocketId,
    tx: mpsc::UnboundedSender<SocketEnvelope>,
}

impl SocketEventSink {
    /// Creates a sink that tags events with `socket_id`.
    #[must_use]
    pub fn new(socket_id: SocketId, tx: mpsc::UnboundedSender<SocketEnvelope>) -> Self {
        Self { socket_id, tx }
    }

    /// Returns the ID of the owning socket.
    #[inline]
    #[must_use]
    pub fn socket_id(&self) -> SocketId {
        self.socket_id
    }

    /// Pushes an event. Events sent after the transport is gone are dropped.
    pub fn emit(&self, event: SocketEvent) {
        let envelope = SocketEnvelope {
            socket_id: self.socket_id,
            event,
        };
        if self.tx.send(envelope).is_err() {
            trace!(socket_id = %self.socket_id, "Socket event dropped, transport gone");
        }
    }
}

// ============================================================================
// SocketRequest
// ============================================================================

/// Everything a factory needs to open one socket.
#[derive(Debug, Clone, PartialEq)]
pub struct SocketRequest {
    /// Server address.
    pub address: Url,
    /// Requested subprotocols, in preference order.
    pub subprotocols: Vec<String>,
    /// Options forwarded opaquely to the factory.
    pub passthrough: PassthroughOptions,
}

// ============================================================================
// Socket / SocketFactory
// ============================================================================

/// One WebSocket connection attempt.
///
/// All operations are non-blocking. Outcomes arrive later as
/// [`SocketEvent`]s on the sink the socket was created with.
pub trait Socket: Send {
    /// Returns the current lifecycle phase.
    fn phase(&self) -> SocketPhase;

    /// Queues a text frame. Completion arrives as [`SocketEvent::Sent`].
    fn send(&mut self, frame: String);

    /// Queues a ping. Completion arrives as [`SocketEvent::PingSent`].
    fn ping(&mut self);

    /// Starts a graceful close handshake.
    fn close(&mut self, code: u16, reason: &str);

    /// Drops the connection without a close handshake.
    fn terminate(&mut self);
}

/// Creates sockets for the transport.
pub trait SocketFactory: Send + Sync {
    /// Creates a socket and starts its handshake.
    ///
    /// # Errors
    ///
    /// Any error means no socket exists and no events will be emitted for
    /// the sink's ID.
    fn create(&self, request: &SocketRequest, sink: SocketEventSink) -> Result<Box<dyn Socket>>;
}

// ============================================================================
// Tests
// ============================================================================
