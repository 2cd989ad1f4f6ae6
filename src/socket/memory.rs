//! In-memory socket adapter.
//!
//! A deterministic, scriptable [`Socket`] implementation. Every socket the
//! [`MemoryFactory`] creates is paired with a [`MemoryPeer`] that plays the
//! remote end: it opens the socket, delivers frames and pongs, completes
//! sends and pings, and closes the connection.
//!
//! Nothing happens on its own unless a [`MemoryBehavior`] switch asks for it,
//! so tests decide the exact interleaving of socket notifications.
//!
//! # Example
//!
//! ```ignore
//! let factory = MemoryFactory::manual();
//! let transport = Transport::builder()
//!     .address("ws://memory.test")
//!     .factory(factory.clone())
//!     .build()?;
//!
//! transport.connect()?;
//! factory.last_peer().unwrap().open();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{Error, Result};

use super::adapter::{
    CLOSE_ABNORMAL, CLOSE_NO_STATUS, Socket, SocketEvent, SocketEventSink, SocketFactory,
    SocketId, SocketPayload, SocketPhase, SocketRequest,
};

// ============================================================================
// MemoryBehavior
// ============================================================================

/// Switches controlling what the simulated peer does without being told.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryBehavior {
    /// Complete the handshake as soon as the socket is created.
    pub auto_open: bool,
    /// Report every send as transmitted.
    pub ack_sends: bool,
    /// Report every ping as transmitted and answer it with a pong.
    pub answer_pings: bool,
    /// Finish close handshakes immediately.
    pub complete_close: bool,
}

impl MemoryBehavior {
    /// Peer that does nothing unless driven through [`MemoryPeer`].
    #[must_use]
    pub const fn manual() -> Self {
        Self {
            auto_open: false,
            ack_sends: false,
            answer_pings: false,
            complete_close: false,
        }
    }

    /// Peer that behaves like a healthy server.
    #[must_use]
    pub const fn responsive() -> Self {
        Self {
            auto_open: true,
            ack_sends: true,
            answer_pings: true,
            complete_close: true,
        }
    }
}

// ============================================================================
// PeerState
// ============================================================================

#[derive(Debug)]
struct PeerState {
    phase: SocketPhase,
    sent: Vec<String>,
    pings: usize,
    close_requests: Vec<(u16, String)>,
    terminated: bool,
}

impl PeerState {
    fn new() -> Self {
        Self {
            phase: SocketPhase::Connecting,
            sent: Vec::new(),
            pings: 0,
            close_requests: Vec::new(),
            terminated: false,
        }
    }
}

// ============================================================================
// MemoryPeer
// ============================================================================

/// Remote end of one in-memory socket.
#[derive(Debug, Clone)]
pub struct MemoryPeer {
    request: SocketRequest,
    state: Arc<Mutex<PeerState>>,
    sink: SocketEventSink,
}

impl MemoryPeer {
    /// Returns the ID of the paired socket.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SocketId {
        self.sink.socket_id()
    }

    /// Returns the request the socket was created with.
    #[inline]
    #[must_use]
    pub fn request(&self) -> &SocketRequest {
        &self.request
    }

    /// Returns the socket's current phase.
    #[must_use]
    pub fn phase(&self) -> SocketPhase {
        self.state.lock().phase
    }

    /// Returns every frame the transport sent on this socket.
    #[must_use]
    pub fn sent_frames(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Returns the number of pings the transport sent.
    #[must_use]
    pub fn ping_count(&self) -> usize {
        self.state.lock().pings
    }

    /// Returns every `close(code, reason)` call, in order.
    #[must_use]
    pub fn close_requests(&self) -> Vec<(u16, String)> {
        self.state.lock().close_requests.clone()
    }

    /// Returns `true` if the transport terminated the socket.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    /// Completes the handshake.
    pub fn open(&self) {
        {
            let mut state = self.state.lock();
            if state.phase != SocketPhase::Connecting {
                return;
            }
            state.phase = SocketPhase::Open;
        }
        self.sink.emit(SocketEvent::Open);
    }

    /// Fails the handshake with an abnormal closure.
    pub fn fail_handshake(&self, cause: impl Into<String>) {
        self.state.lock().phase = SocketPhase::Closed;
        self.sink.emit(SocketEvent::Error(cause.into()));
        self.sink.emit(SocketEvent::Close {
            code: CLOSE_ABNORMAL,
            reason: String::new(),
        });
    }

    /// Delivers a text frame.
    pub fn receive(&self, text: impl Into<String>) {
        self.sink
            .emit(SocketEvent::Message(SocketPayload::Text(text.into())));
    }

    /// Delivers a binary frame.
    pub fn receive_binary(&self, data: impl Into<Vec<u8>>) {
        self.sink
            .emit(SocketEvent::Message(SocketPayload::Binary(data.into())));
    }

    /// Delivers a pong.
    pub fn pong(&self) {
        self.sink.emit(SocketEvent::Pong);
    }

    /// Reports the outcome of the oldest pending ping.
    pub fn complete_ping(&self, result: std::result::Result<(), String>) {
        self.sink.emit(SocketEvent::PingSent(result));
    }

    /// Reports the outcome of the oldest pending send.
    pub fn complete_send(&self, result: std::result::Result<(), String>) {
        self.sink.emit(SocketEvent::Sent(result));
    }

    /// Closes the connection from the remote side.
    pub fn remote_close(&self, code: u16, reason: impl Into<String>) {
        self.state.lock().phase = SocketPhase::Closed;
        self.sink.emit(SocketEvent::Close {
            code,
            reason: reason.into(),
        });
    }

    /// Completes a close handshake the transport started.
    ///
    /// Echoes the code and reason of the last close request.
    pub fn finish_close(&self) {
        let (code, reason) = {
            let mut state = self.state.lock();
            state.phase = SocketPhase::Closed;
            state
                .close_requests
                .last()
                .cloned()
                .unwrap_or((CLOSE_NO_STATUS, String::new()))
        };
        self.sink.emit(SocketEvent::Close { code, reason });
    }
}

// ============================================================================
// MemorySocket
// ============================================================================

struct MemorySocket {
    state: Arc<Mutex<PeerState>>,
    behavior: Arc<Mutex<MemoryBehavior>>,
    sink: SocketEventSink,
}

impl Socket for MemorySocket {
    fn phase(&self) -> SocketPhase {
        self.state.lock().phase
    }

    fn send(&mut self, frame: String) {
        trace!(socket_id = %self.sink.socket_id(), len = frame.len(), "Memory send");
        self.state.lock().sent.push(frame);
        if self.behavior.lock().ack_sends {
            self.sink.emit(SocketEvent::Sent(Ok(())));
        }
    }

    fn ping(&mut self) {
        self.state.lock().pings += 1;
        if self.behavior.lock().answer_pings {
            self.sink.emit(SocketEvent::PingSent(Ok(())));
            self.sink.emit(SocketEvent::Pong);
        }
    }

    fn close(&mut self, code: u16, reason: &str) {
        let complete = self.behavior.lock().complete_close;
        let emit_close = {
            let mut state = self.state.lock();
            state.close_requests.push((code, reason.to_owned()));
            match state.phase {
                SocketPhase::Connecting | SocketPhase::Open => {
                    state.phase = if complete {
                        SocketPhase::Closed
                    } else {
                        SocketPhase::Closing
                    };
                    complete
                }
                SocketPhase::Closing | SocketPhase::Closed => false,
            }
        };
        if emit_close {
            self.sink.emit(SocketEvent::Close {
                code,
                reason: reason.to_owned(),
            });
        }
    }

    fn terminate(&mut self) {
        let was_closed = {
            let mut state = self.state.lock();
            state.terminated = true;
            let was_closed = state.phase == SocketPhase::Closed;
            state.phase = SocketPhase::Closed;
            was_closed
        };
        if !was_closed {
            self.sink.emit(SocketEvent::Close {
                code: CLOSE_ABNORMAL,
                reason: String::new(),
            });
        }
    }
}

// ============================================================================
// MemoryFactory
// ============================================================================

#[derive(Debug, Default)]
struct FactoryShared {
    behavior: Arc<Mutex<MemoryBehavior>>,
    peers: Mutex<Vec<MemoryPeer>>,
    fail_next: Mutex<Option<String>>,
}

/// Factory producing in-memory sockets.
///
/// Clones share state, so a test can keep one clone and hand the other to
/// the transport.
///
/// The peer of every created socket is kept until [`clear_peers`] is
/// called, so a factory driving many connections should clear it between
/// batches.
///
/// [`clear_peers`]: MemoryFactory::clear_peers
#[derive(Debug, Clone, Default)]
pub struct MemoryFactory {
    shared: Arc<FactoryShared>,
}

impl MemoryFactory {
    /// Creates a factory with the given behavior.
    #[must_use]
    pub fn new(behavior: MemoryBehavior) -> Self {
        let factory = Self::default();
        *factory.shared.behavior.lock() = behavior;
        factory
    }

    /// Creates a factory whose peers only act when driven.
    #[must_use]
    pub fn manual() -> Self {
        Self::new(MemoryBehavior::manual())
    }

    /// Creates a factory whose peers behave like a healthy server.
    #[must_use]
    pub fn responsive() -> Self {
        Self::new(MemoryBehavior::responsive())
    }

    /// Returns the current behavior.
    #[must_use]
    pub fn behavior(&self) -> MemoryBehavior {
        *self.shared.behavior.lock()
    }

    /// Replaces the behavior. Applies to existing sockets too.
    pub fn set_behavior(&self, behavior: MemoryBehavior) {
        *self.shared.behavior.lock() = behavior;
    }

    /// Turns automatic ping answers on or off.
    pub fn set_answer_pings(&self, answer: bool) {
        self.shared.behavior.lock().answer_pings = answer;
    }

    /// Makes the next `create` call fail with `cause`.
    pub fn fail_next_create(&self, cause: impl Into<String>) {
        *self.shared.fail_next.lock() = Some(cause.into());
    }

    /// Returns the peers of every socket created so far.
    #[must_use]
    pub fn peers(&self) -> Vec<MemoryPeer> {
        self.shared.peers.lock().clone()
    }

    /// Returns the peer of the most recently created socket.
    #[must_use]
    pub fn last_peer(&self) -> Option<MemoryPeer> {
        self.shared.peers.lock().last().cloned()
    }

    /// Returns the number of sockets created since the last clear.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.shared.peers.lock().len()
    }

    /// Forgets every recorded peer.
    ///
    /// Live sockets keep working; their peers are only dropped from this
    /// factory's records.
    pub fn clear_peers(&self) {
        self.shared.peers.lock().clear();
    }
}

impl SocketFactory for MemoryFactory {
    fn create(&self, request: &SocketRequest, sink: SocketEventSink) -> Result<Box<dyn Socket>> {
        if let Some(cause) = self.shared.fail_next.lock().take() {
            return Err(Error::socket_creation(cause));
        }

        let state = Arc::new(Mutex::new(PeerState::new()));
        let peer = MemoryPeer {
            request: request.clone(),
            state: Arc::clone(&state),
            sink: sink.clone(),
        };
        self.shared.peers.lock().push(peer.clone());

        let socket = MemorySocket {
            state,
            behavior: Arc::clone(&self.shared.behavior),
            sink,
        };

        if self.behavior().auto_open {
            peer.open();
        }

        Ok(Box::new(socket))
    }
}

// ============================================================================
// Tests
// ============================================================================
