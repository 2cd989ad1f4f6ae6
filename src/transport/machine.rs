//! Connection state machine.
//!
//! [`Machine`] reconciles the caller's three-state view of the connection
//! with the four-phase lifecycle of the underlying socket. It performs no
//! I/O and owns no timers: callers feed it socket events and the current
//! time, and it queues notifications on its [`Emitter`].
//!
//! # Close Interpretation
//!
//! A socket's `close` notification is read against the outward state and
//! the [`SocketPhaseHint`], never against the socket's own final phase:
//!
//! | Outward state | Hint | Meaning |
//! |---------------|------|---------|
//! | `Disconnected` | any | Expected, absorbed silently |
//! | `Connecting` | `Disconnecting` | Old socket gone, open the deferred one |
//! | `Connecting` | other | Could not connect |
//! | `Connected` | any | Closed unexpectedly |
//!
//! # Failure Path
//!
//! Heartbeat timeouts, failed pings, failed sends and binary frames all
//! terminate the socket (no close handshake), move to `Disconnected` and
//! emit `disconnect` with the triggering error. The close produced by the
//! termination is then absorbed by the first row above.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::TransportConfig;
use crate::error::{Error, Result};
use crate::socket::{
    CLOSE_NORMAL, Socket, SocketEnvelope, SocketEvent, SocketEventSink, SocketFactory, SocketId,
    SocketPayload, SocketPhase, SocketRequest,
};

use super::emitter::{Emitter, EventReceiver, TransportEvent};
use super::heartbeat::{HeartbeatAction, HeartbeatMonitor};
use super::state::{SocketPhaseHint, TransportState};

// ============================================================================
// LiveSocket
// ============================================================================

/// The one socket whose events the machine listens to.
struct LiveSocket {
    id: SocketId,
    inner: Box<dyn Socket>,
}

// ============================================================================
// Machine
// ============================================================================

/// Transport state machine.
///
/// Not thread-safe. Every call must be serialized by the owner, which is
/// what [`Transport`](super::Transport) does with its mutex and event loop.
pub struct Machine {
    request: SocketRequest,
    factory: Arc<dyn SocketFactory>,
    socket_tx: mpsc::UnboundedSender<SocketEnvelope>,
    emitter: Emitter,
    heartbeat: HeartbeatMonitor,
    state: TransportState,
    socket: Option<LiveSocket>,
    phase_hint: SocketPhaseHint,
    sockets_created: u64,
}

// ============================================================================
// Machine - Constructor / Queries
// ============================================================================

impl Machine {
    /// Creates a disconnected machine.
    ///
    /// Sockets it creates report their events on `socket_tx`.
    #[must_use]
    pub fn new(
        config: &TransportConfig,
        factory: Arc<dyn SocketFactory>,
        socket_tx: mpsc::UnboundedSender<SocketEnvelope>,
    ) -> Self {
        Self {
            request: config.socket_request(),
            factory,
            socket_tx,
            emitter: Emitter::new(),
            heartbeat: HeartbeatMonitor::new(
                config.options.heartbeat_interval(),
                config.options.heartbeat_timeout(),
            ),
            state: TransportState::Disconnected,
            socket: None,
            phase_hint: SocketPhaseHint::None,
            sockets_created: 0,
        }
    }

    /// Adds a notification subscriber.
    pub fn subscribe(&mut self) -> EventReceiver {
        self.emitter.subscribe()
    }

    /// Returns the outward state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> TransportState {
        self.state
    }

    /// Returns the socket phase hint.
    #[inline]
    #[must_use]
    pub fn phase_hint(&self) -> SocketPhaseHint {
        self.phase_hint
    }

    /// Returns the ID of the socket currently listened to.
    #[inline]
    #[must_use]
    pub fn socket_id(&self) -> Option<SocketId> {
        self.socket.as_ref().map(|socket| socket.id)
    }

    /// Returns the heartbeat monitor.
    #[inline]
    #[must_use]
    pub fn heartbeat(&self) -> &HeartbeatMonitor {
        &self.heartbeat
    }

    /// Returns the earliest heartbeat deadline.
    #[inline]
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heartbeat.next_deadline()
    }
}

// ============================================================================
// Machine - Caller Operations
// ============================================================================

impl Machine {
    /// Starts a connection attempt.
    ///
    /// If the previous socket is still closing, the new socket is created
    /// once that socket reports `close`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless disconnected.
    pub fn connect(&mut self) -> Result<()> {
        if self.state != TransportState::Disconnected {
            return Err(Error::invalid_state(format!(
                "connect() called while {}",
                self.state
            )));
        }

        debug!(address = %self.request.address, "Connecting");
        self.state = TransportState::Connecting;
        self.emitter.emit(TransportEvent::Connecting);

        if self.socket.is_none() {
            self.open_socket();
        } else {
            debug!(hint = ?self.phase_hint, "Previous socket still closing, connect deferred");
        }

        Ok(())
    }

    /// Disconnects, echoing `error` on the `disconnect` notification.
    ///
    /// An open socket is closed gracefully. A socket still in its handshake
    /// is closed when its `open` arrives.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if already disconnected.
    pub fn disconnect(&mut self, error: Option<Error>) -> Result<()> {
        if self.state == TransportState::Disconnected {
            return Err(Error::invalid_state("disconnect() called while disconnected"));
        }

        debug!(from = %self.state, with_error = error.is_some(), "Disconnecting");
        self.heartbeat.stop();
        self.abandon_socket(true);
        self.state = TransportState::Disconnected;
        self.emitter
            .emit(TransportEvent::Disconnect(error.map(Arc::new)));

        Ok(())
    }

    /// Transmits a frame.
    ///
    /// A transmission failure surfaces later as a `disconnect`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless connected.
    pub fn send(&mut self, frame: String) -> Result<()> {
        if self.state != TransportState::Connected {
            return Err(Error::invalid_state(format!(
                "send() called while {}",
                self.state
            )));
        }

        let Some(socket) = self.socket.as_mut() else {
            return Err(Error::invalid_state("send() called without a socket"));
        };

        trace!(socket_id = %socket.id, len = frame.len(), "Sending frame");
        socket.inner.send(frame);
        Ok(())
    }
}

// ============================================================================
// Machine - Socket Events
// ============================================================================

impl Machine {
    /// Handles one socket notification. Events from discarded sockets are
    /// dropped.
    pub fn handle_socket_event(&mut self, envelope: SocketEnvelope, now: Instant) {
        let SocketEnvelope { socket_id, event } = envelope;

        if self.socket_id() != Some(socket_id) {
            trace!(%socket_id, ?event, "Event from discarded socket dropped");
            return;
        }

        match event {
            SocketEvent::Open => self.on_open(now),
            SocketEvent::Message(payload) => self.on_message(payload),
            SocketEvent::Pong => {
                self.heartbeat.pong_received();
            }
            SocketEvent::Close { code, reason } => self.on_close(code, reason),
            SocketEvent::Error(error) => {
                debug!(%socket_id, %error, "Socket error");
            }
            SocketEvent::Sent(Err(cause)) => {
                if self.state == TransportState::Connected {
                    self.fail(Error::send_failed(cause));
                }
            }
            SocketEvent::PingSent(Err(cause)) => {
                if self.state == TransportState::Connected {
                    self.fail(Error::ping_failed(cause));
                }
            }
            SocketEvent::Sent(Ok(())) | SocketEvent::PingSent(Ok(())) => {}
        }
    }

    fn on_open(&mut self, now: Instant) {
        if self.phase_hint == SocketPhaseHint::Disconnecting {
            trace!("Open from a socket already closing ignored");
            return;
        }

        match self.state {
            TransportState::Disconnected => {
                debug!("Handshake finished after disconnect, closing socket");
                if let Some(socket) = self.socket.as_mut() {
                    socket.inner.close(CLOSE_NORMAL, "");
                }
                self.phase_hint = SocketPhaseHint::Disconnecting;
            }
            TransportState::Connecting => {
                self.state = TransportState::Connected;
                self.phase_hint = SocketPhaseHint::Connected;
                self.heartbeat.start(now);
                info!(address = %self.request.address, "Transport connected");
                self.emitter.emit(TransportEvent::Connect);
            }
            TransportState::Connected => {
                warn!("Open received while already connected");
            }
        }
    }

    fn on_message(&mut self, payload: SocketPayload) {
        if self.state != TransportState::Connected {
            trace!(state = %self.state, "Frame dropped");
            return;
        }

        match payload {
            SocketPayload::Text(text) => {
                trace!(len = text.len(), "Frame received");
                self.emitter.emit(TransportEvent::Message(text));
            }
            SocketPayload::Binary(_) => self.fail(Error::NonTextMessage),
        }
    }

    fn on_close(&mut self, code: u16, reason: String) {
        self.socket = None;
        let hint = std::mem::take(&mut self.phase_hint);

        match (self.state, hint) {
            (TransportState::Disconnected, _) => {
                debug!(code, "Socket closed");
            }
            (TransportState::Connecting, SocketPhaseHint::Disconnecting) => {
                debug!(code, "Previous socket closed, opening deferred connection");
                self.open_socket();
            }
            (TransportState::Connecting, _) => {
                warn!(code, %reason, "Could not connect");
                self.heartbeat.stop();
                self.state = TransportState::Disconnected;
                self.emitter.emit(TransportEvent::Disconnect(Some(Arc::new(
                    Error::connect_failed(code, reason),
                ))));
            }
            (TransportState::Connected, _) => {
                warn!(code, %reason, "Socket closed unexpectedly");
                self.heartbeat.stop();
                self.state = TransportState::Disconnected;
                self.emitter.emit(TransportEvent::Disconnect(Some(Arc::new(
                    Error::unexpected_close(code, reason),
                ))));
            }
        }
    }
}

// ============================================================================
// Machine - Heartbeat
// ============================================================================

impl Machine {
    /// Fires heartbeat deadlines that are due at `now`.
    pub fn handle_timers(&mut self, now: Instant) {
        match self.heartbeat.poll(now) {
            HeartbeatAction::Idle => {}
            HeartbeatAction::Probe => {
                if let Some(socket) = self.socket.as_mut() {
                    socket.inner.ping();
                }
            }
            HeartbeatAction::TimedOut => {
                let timeout_ms = self.heartbeat.timeout_ms();
                self.fail(Error::heartbeat_timeout(timeout_ms));
            }
        }
    }
}

// ============================================================================
// Machine - Internals
// ============================================================================

impl Machine {
    /// Creates a socket for the current attempt.
    fn open_socket(&mut self) {
        self.sockets_created += 1;
        let id = SocketId::new(self.sockets_created);
        let sink = SocketEventSink::new(id, self.socket_tx.clone());

        match self.factory.create(&self.request, sink) {
            Ok(inner) => {
                trace!(socket_id = %id, "Socket created");
                self.socket = Some(LiveSocket { id, inner });
                self.phase_hint = SocketPhaseHint::Connecting;
            }
            Err(err) => {
                warn!(error = %err, "Socket creation failed");
                let err = match err {
                    err @ Error::SocketCreation { .. } => err,
                    other => Error::socket_creation(other.to_string()),
                };
                self.phase_hint = SocketPhaseHint::None;
                self.state = TransportState::Disconnected;
                self.emitter
                    .emit(TransportEvent::Disconnect(Some(Arc::new(err))));
            }
        }
    }

    /// Stops using the current socket.
    ///
    /// Open sockets are closed (`graceful`) or terminated. Sockets in their
    /// handshake are left alone; `on_open` closes them.
    fn abandon_socket(&mut self, graceful: bool) {
        let Some(socket) = self.socket.as_mut() else {
            return;
        };

        match socket.inner.phase() {
            SocketPhase::Connecting => {}
            SocketPhase::Open => {
                if graceful {
                    socket.inner.close(CLOSE_NORMAL, "");
                } else {
                    socket.inner.terminate();
                }
                self.phase_hint = SocketPhaseHint::Disconnecting;
            }
            SocketPhase::Closing | SocketPhase::Closed => {
                self.phase_hint = SocketPhaseHint::Disconnecting;
            }
        }
    }

    /// Internal failure path.
    fn fail(&mut self, err: Error) {
        warn!(error = %err, "Transport failure");
        self.heartbeat.stop();
        self.abandon_socket(false);
        self.state = TransportState::Disconnected;
        self.emitter
            .emit(TransportEvent::Disconnect(Some(Arc::new(err))));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use proptest::prelude::*;

    use crate::config::TransportOptions;
    use crate::socket::{CLOSE_ABNORMAL, MemoryFactory, MemoryPeer, SocketEventReceiver};

    // ------------------------------------------------------------------------
    // Harness
    // ------------------------------------------------------------------------

    struct Harness {
        machine: Machine,
        factory: MemoryFactory,
        socket_rx: SocketEventReceiver,
        events: EventReceiver,
        now: Instant,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_options(TransportOptions::new().with_heartbeat(20, 19))
        }

        fn with_options(options: TransportOptions) -> Self {
            let config = TransportConfig::new("ws://memory.test/feed", options).expect("config");
            let factory = MemoryFactory::manual();
            let (socket_tx, socket_rx) = mpsc::unbounded_channel();
            let mut machine = Machine::new(&config, Arc::new(factory.clone()), socket_tx);
            let events = machine.subscribe();
            Self {
                machine,
                factory,
                socket_rx,
                events,
                now: Instant::now(),
            }
        }

        fn pump(&mut self) {
            while let Ok(envelope) = self.socket_rx.try_recv() {
                self.machine.handle_socket_event(envelope, self.now);
            }
        }

        fn advance(&mut self, ms: u64) {
            let target = self.now + Duration::from_millis(ms);
            while let Some(deadline) = self.machine.next_deadline() {
                if deadline > target {
                    break;
                }
                self.now = deadline;
                self.machine.handle_timers(deadline);
                self.pump();
            }
            self.now = target;
        }

        fn peer(&self) -> MemoryPeer {
            self.factory.last_peer().expect("socket created")
        }

        fn events(&mut self) -> Vec<TransportEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }

        fn event_names(&mut self) -> Vec<&'static str> {
            self.events().iter().map(TransportEvent::name).collect()
        }

        fn connected() -> Self {
            let mut h = Self::new();
            h.machine.connect().expect("connect");
            h.peer().open();
            h.pump();
            assert_eq!(h.machine.state(), TransportState::Connected);
            h.events();
            h
        }
    }

    fn disconnect_error(event: &TransportEvent) -> &Error {
        event.error().expect("disconnect with error")
    }

    // ------------------------------------------------------------------------
    // Preconditions
    // ------------------------------------------------------------------------

    #[test]
    fn test_connect_requires_disconnected() {
        let mut h = Harness::new();
        h.machine.connect().expect("first connect");

        let err = h.machine.connect().expect_err("connecting");
        assert!(matches!(err, Error::InvalidState { .. }));

        h.peer().open();
        h.pump();
        let err = h.machine.connect().expect_err("connected");
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[test]
    fn test_disconnect_requires_not_disconnected() {
        let mut h = Harness::new();
        let err = h.machine.disconnect(None).expect_err("disconnected");
        assert!(matches!(err, Error::InvalidState { .. }));
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_send_requires_connected() {
        let mut h = Harness::new();
        assert!(h.machine.send("x".into()).is_err());

        h.machine.connect().expect("connect");
        let err = h.machine.send("x".into()).expect_err("connecting");
        assert!(matches!(err, Error::InvalidState { .. }));
        assert!(h.peer().sent_frames().is_empty());
    }

    // ------------------------------------------------------------------------
    // Connect
    // ------------------------------------------------------------------------

    #[test]
    fn test_connect_then_open() {
        let mut h = Harness::new();

        h.machine.connect().expect("connect");
        assert_eq!(h.machine.state(), TransportState::Connecting);
        assert_eq!(h.machine.phase_hint(), SocketPhaseHint::Connecting);
        assert_eq!(h.factory.created_count(), 1);
        assert_eq!(h.event_names(), vec!["connecting"]);

        h.peer().open();
        h.pump();

        assert_eq!(h.machine.state(), TransportState::Connected);
        assert_eq!(h.machine.phase_hint(), SocketPhaseHint::Connected);
        assert!(h.machine.heartbeat().is_running());
        assert_eq!(h.event_names(), vec!["connect"]);
    }

    #[test]
    fn test_socket_request_uses_config() {
        let options = TransportOptions::new()
            .with_subprotocol("feedme")
            .with_passthrough("disable_nagle", true);
        let mut h = Harness::with_options(options);
        h.machine.connect().expect("connect");

        let request = h.peer().request().clone();
        assert_eq!(request.address.as_str(), "ws://memory.test/feed");
        assert_eq!(request.subprotocols, vec!["feedme".to_string()]);
        assert!(request.passthrough.contains_key("disable_nagle"));
    }

    #[test]
    fn test_construction_failure_emits_connecting_then_disconnect() {
        let mut h = Harness::new();
        h.factory.fail_next_create("bad address");

        h.machine.connect().expect("connect itself succeeds");

        assert_eq!(h.machine.state(), TransportState::Disconnected);
        assert_eq!(h.machine.socket_id(), None);

        let events = h.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], TransportEvent::Connecting));
        let err = disconnect_error(&events[1]);
        assert!(matches!(err, Error::SocketCreation { .. }));
        assert_eq!(err.cause(), Some("bad address"));

        // The transport is usable again right away.
        h.machine.connect().expect("reconnect");
        assert_eq!(h.factory.created_count(), 1);
    }

    #[test]
    fn test_handshake_failure_reports_connect_failed() {
        let mut h = Harness::new();
        h.machine.connect().expect("connect");
        h.events();

        h.peer().fail_handshake("connection refused");
        h.pump();

        assert_eq!(h.machine.state(), TransportState::Disconnected);
        assert_eq!(h.machine.socket_id(), None);
        assert_eq!(h.machine.phase_hint(), SocketPhaseHint::None);

        let events = h.events();
        assert_eq!(events.len(), 1);
        let err = disconnect_error(&events[0]);
        assert!(matches!(err, Error::ConnectFailed { .. }));
        assert_eq!(err.close_code(), Some(CLOSE_ABNORMAL));
    }

    // ------------------------------------------------------------------------
    // Disconnect
    // ------------------------------------------------------------------------

    #[test]
    fn test_disconnect_closes_open_socket() {
        let mut h = Harness::connected();
        let peer = h.peer();

        h.machine.disconnect(None).expect("disconnect");

        assert_eq!(h.machine.state(), TransportState::Disconnected);
        assert_eq!(h.machine.phase_hint(), SocketPhaseHint::Disconnecting);
        assert!(!h.machine.heartbeat().is_running());
        assert_eq!(peer.close_requests(), vec![(CLOSE_NORMAL, String::new())]);
        assert!(matches!(h.events().as_slice(), [TransportEvent::Disconnect(None)]));

        peer.finish_close();
        h.pump();

        assert_eq!(h.machine.socket_id(), None);
        assert_eq!(h.machine.phase_hint(), SocketPhaseHint::None);
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_disconnect_echoes_caller_error() {
        let mut h = Harness::connected();

        h.machine
            .disconnect(Some(Error::application("user logged out")))
            .expect("disconnect");

        let events = h.events();
        let err = disconnect_error(&events[0]);
        assert!(matches!(err, Error::Application(_)));
        assert_eq!(err.to_string(), "user logged out");
    }

    #[test]
    fn test_disconnect_during_handshake_closes_on_open() {
        let mut h = Harness::new();
        h.machine.connect().expect("connect");
        let peer = h.peer();

        h.machine.disconnect(None).expect("disconnect");
        assert!(peer.close_requests().is_empty());
        assert_eq!(h.machine.phase_hint(), SocketPhaseHint::Connecting);

        peer.open();
        h.pump();
        assert_eq!(peer.close_requests().len(), 1);
        assert_eq!(h.machine.state(), TransportState::Disconnected);

        peer.finish_close();
        h.pump();

        assert_eq!(h.machine.socket_id(), None);
        assert_eq!(h.event_names(), vec!["connecting", "disconnect"]);
    }

    #[test]
    fn test_open_for_closing_socket_is_not_closed_twice() {
        let mut h = Harness::new();
        h.machine.connect().expect("connect");
        let peer = h.peer();

        // Handshake completes but the open notification is still queued.
        peer.open();
        h.machine.disconnect(None).expect("disconnect");
        assert_eq!(peer.close_requests().len(), 1);

        h.machine.connect().expect("reconnect");
        h.pump();

        assert_eq!(peer.close_requests().len(), 1);
        assert_eq!(h.machine.state(), TransportState::Connecting);
        assert_eq!(h.factory.created_count(), 1);
    }

    // ------------------------------------------------------------------------
    // Deferred Reconnect
    // ------------------------------------------------------------------------

    #[test]
    fn test_reconnect_waits_for_previous_close() {
        let mut h = Harness::connected();
        let old = h.peer();

        h.machine.disconnect(None).expect("disconnect");
        h.machine.connect().expect("connect again");

        assert_eq!(h.machine.state(), TransportState::Connecting);
        assert_eq!(h.factory.created_count(), 1);

        old.finish_close();
        h.pump();

        assert_eq!(h.factory.created_count(), 2);
        assert_eq!(h.machine.phase_hint(), SocketPhaseHint::Connecting);

        h.peer().open();
        h.pump();

        assert_eq!(h.machine.state(), TransportState::Connected);
        assert_eq!(h.event_names(), vec!["disconnect", "connecting", "connect"]);
    }

    #[test]
    fn test_reconnect_during_handshake_reuses_socket() {
        let mut h = Harness::new();
        h.machine.connect().expect("connect");
        h.machine.disconnect(None).expect("disconnect");
        h.machine.connect().expect("connect again");

        h.peer().open();
        h.pump();

        assert_eq!(h.machine.state(), TransportState::Connected);
        assert_eq!(h.factory.created_count(), 1);
        assert!(h.peer().close_requests().is_empty());
        assert_eq!(
            h.event_names(),
            vec!["connecting", "disconnect", "connecting", "connect"]
        );
    }

    #[test]
    fn test_deferred_reconnect_construction_failure() {
        let mut h = Harness::connected();
        let old = h.peer();

        h.machine.disconnect(None).expect("disconnect");
        h.machine.connect().expect("connect again");
        h.events();

        h.factory.fail_next_create("refused");
        old.finish_close();
        h.pump();

        assert_eq!(h.machine.state(), TransportState::Disconnected);
        let events = h.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            disconnect_error(&events[0]),
            Error::SocketCreation { .. }
        ));
    }

    #[test]
    fn test_events_from_discarded_socket_are_ignored() {
        let mut h = Harness::connected();
        let old = h.peer();

        h.machine.disconnect(None).expect("disconnect");
        h.machine.connect().expect("connect again");
        old.finish_close();
        h.pump();
        h.peer().open();
        h.pump();
        h.events();

        old.receive("stale");
        old.remote_close(1001, "late");
        old.complete_send(Err("late failure".into()));
        h.pump();

        assert_eq!(h.machine.state(), TransportState::Connected);
        assert!(h.events().is_empty());
    }

    // ------------------------------------------------------------------------
    // Unexpected Close
    // ------------------------------------------------------------------------

    #[test]
    fn test_remote_close_while_connected() {
        let mut h = Harness::connected();

        h.peer().remote_close(1001, "going away");
        h.pump();

        assert_eq!(h.machine.state(), TransportState::Disconnected);
        assert_eq!(h.machine.socket_id(), None);
        assert!(!h.machine.heartbeat().is_running());

        let events = h.events();
        let err = disconnect_error(&events[0]);
        assert!(matches!(err, Error::UnexpectedClose { .. }));
        assert_eq!(err.close_code(), Some(1001));
        assert_eq!(err.close_reason(), Some("going away"));
    }

    #[test]
    fn test_remote_close_while_connecting() {
        let mut h = Harness::new();
        h.machine.connect().expect("connect");
        h.events();

        h.peer().remote_close(1002, "protocol error");
        h.pump();

        let events = h.events();
        let err = disconnect_error(&events[0]);
        assert!(matches!(err, Error::ConnectFailed { .. }));
        assert_eq!(err.close_code(), Some(1002));
    }

    // ------------------------------------------------------------------------
    // Messages / Send
    // ------------------------------------------------------------------------

    #[test]
    fn test_text_message_is_delivered() {
        let mut h = Harness::connected();

        h.peer().receive("{\"MessageType\":\"ActionRevelation\"}");
        h.pump();

        let events = h.events();
        assert!(
            matches!(events.as_slice(), [TransportEvent::Message(m)] if m.contains("ActionRevelation"))
        );
    }

    #[test]
    fn test_binary_message_fails_transport() {
        let mut h = Harness::connected();
        let peer = h.peer();

        peer.receive_binary(vec![1, 2, 3]);
        h.pump();

        assert_eq!(h.machine.state(), TransportState::Disconnected);
        assert!(peer.is_terminated());

        let events = h.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(disconnect_error(&events[0]), Error::NonTextMessage));

        // The termination's close is absorbed.
        assert_eq!(h.machine.socket_id(), None);
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_message_after_disconnect_is_dropped() {
        let mut h = Harness::connected();
        let peer = h.peer();

        h.machine.disconnect(None).expect("disconnect");
        h.events();

        peer.receive("late");
        h.pump();

        assert!(h.events().is_empty());
    }

    #[test]
    fn test_successful_send_is_silent() {
        let mut h = Harness::connected();

        h.machine.send("hello".into()).expect("send");
        h.peer().complete_send(Ok(()));
        h.pump();

        assert_eq!(h.peer().sent_frames(), vec!["hello".to_string()]);
        assert_eq!(h.machine.state(), TransportState::Connected);
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_send_failure_fails_transport() {
        let mut h = Harness::connected();
        let peer = h.peer();

        h.machine.send("hello".into()).expect("send");
        peer.complete_send(Err("broken pipe".into()));
        h.pump();

        assert_eq!(h.machine.state(), TransportState::Disconnected);
        assert!(peer.is_terminated());

        let events = h.events();
        let err = disconnect_error(&events[0]);
        assert!(matches!(err, Error::SendFailed { .. }));
        assert_eq!(err.cause(), Some("broken pipe"));
    }

    // ------------------------------------------------------------------------
    // Heartbeat
    // ------------------------------------------------------------------------

    #[test]
    fn test_heartbeat_pong_keeps_connection() {
        let mut h = Harness::connected();
        let peer = h.peer();

        h.advance(20);
        assert_eq!(peer.ping_count(), 1);
        assert!(h.machine.heartbeat().is_probing());

        peer.complete_ping(Ok(()));
        peer.pong();
        h.pump();
        assert!(!h.machine.heartbeat().is_probing());

        h.factory.set_answer_pings(true);
        h.advance(100);
        assert!(peer.ping_count() > 1);
        assert_eq!(h.machine.state(), TransportState::Connected);
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_heartbeat_timeout_fails_transport() {
        let mut h = Harness::connected();
        let peer = h.peer();

        h.advance(38);
        assert_eq!(h.machine.state(), TransportState::Connected);

        h.advance(1);
        assert_eq!(h.machine.state(), TransportState::Disconnected);
        assert!(peer.is_terminated());
        assert_eq!(h.machine.next_deadline(), None);

        let events = h.events();
        assert_eq!(events.len(), 1);
        let err = disconnect_error(&events[0]);
        assert!(matches!(err, Error::HeartbeatTimeout { timeout_ms: 19 }));
    }

    #[test]
    fn test_ping_failure_fails_transport() {
        let mut h = Harness::connected();
        let peer = h.peer();

        h.advance(20);
        peer.complete_ping(Err("socket closed".into()));
        h.pump();

        assert_eq!(h.machine.state(), TransportState::Disconnected);
        assert_eq!(h.machine.next_deadline(), None);

        let events = h.events();
        assert_eq!(events.len(), 1);
        assert!(disconnect_error(&events[0]).is_heartbeat_failure());
    }

    #[test]
    fn test_disconnect_cancels_outstanding_probe() {
        let mut h = Harness::connected();

        h.advance(20);
        assert!(h.machine.heartbeat().is_probing());

        h.machine.disconnect(None).expect("disconnect");
        assert_eq!(h.machine.next_deadline(), None);

        h.advance(1000);
        assert_eq!(h.event_names(), vec!["disconnect"]);
    }

    #[test]
    fn test_disabled_heartbeat_never_probes() {
        let mut h = Harness::with_options(TransportOptions::new().without_heartbeat());
        h.machine.connect().expect("connect");
        h.peer().open();
        h.pump();

        assert_eq!(h.machine.next_deadline(), None);
        h.advance(60_000);
        assert_eq!(h.peer().ping_count(), 0);
        assert_eq!(h.machine.state(), TransportState::Connected);
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    #[derive(Debug, Clone)]
    enum Step {
        Connect,
        Disconnect,
        DisconnectWithError,
        Send,
        Open,
        Receive,
        Pong,
        FinishClose,
        RemoteClose,
        FailSend,
        Advance(u64),
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Connect),
            Just(Step::Disconnect),
            Just(Step::DisconnectWithError),
            Just(Step::Send),
            Just(Step::Open),
            Just(Step::Receive),
            Just(Step::Pong),
            Just(Step::FinishClose),
            Just(Step::RemoteClose),
            Just(Step::FailSend),
            (1u64..30).prop_map(Step::Advance),
        ]
    }

    fn check_invariants(h: &Harness) {
        let machine = &h.machine;
        if machine.heartbeat().is_running() {
            assert_eq!(machine.state(), TransportState::Connected);
        }
        if machine.heartbeat().is_probing() {
            assert!(machine.heartbeat().is_running());
        }
        if machine.state() == TransportState::Disconnected && machine.socket_id().is_some() {
            assert_ne!(machine.phase_hint(), SocketPhaseHint::Connected);
        }
        if machine.socket_id().is_none() {
            assert!(matches!(
                machine.phase_hint(),
                SocketPhaseHint::None
            ));
        }
    }

    proptest! {
        #[test]
        fn prop_valid_calls_never_fail(steps in prop::collection::vec(step(), 1..60)) {
            let mut h = Harness::new();
            let mut attempt_open = false;

            for step in steps {
                let state = h.machine.state();
                let peer = h.factory.last_peer();

                match step {
                    Step::Connect if state == TransportState::Disconnected => {
                        prop_assert!(h.machine.connect().is_ok());
                    }
                    Step::Disconnect if state != TransportState::Disconnected => {
                        prop_assert!(h.machine.disconnect(None).is_ok());
                    }
                    Step::DisconnectWithError if state != TransportState::Disconnected => {
                        prop_assert!(h.machine.disconnect(Some(Error::application("x"))).is_ok());
                    }
                    Step::Send if state == TransportState::Connected => {
                        prop_assert!(h.machine.send("frame".into()).is_ok());
                    }
                    Step::Open => {
                        if let Some(peer) = peer { peer.open(); }
                    }
                    Step::Receive => {
                        if let Some(peer) = peer && peer.phase() == SocketPhase::Open {
                            peer.receive("frame");
                        }
                    }
                    Step::Pong => {
                        if let Some(peer) = peer { peer.pong(); }
                    }
                    Step::FinishClose => {
                        if let Some(peer) = peer && peer.phase() == SocketPhase::Closing {
                            peer.finish_close();
                        }
                    }
                    Step::RemoteClose => {
                        if let Some(peer) = peer && peer.phase() != SocketPhase::Closed {
                            peer.remote_close(1001, "bye");
                        }
                    }
                    Step::FailSend => {
                        if let Some(peer) = peer && peer.phase() == SocketPhase::Open {
                            peer.complete_send(Err("reset".into()));
                        }
                    }
                    Step::Advance(ms) => h.advance(ms),
                    _ => {}
                }

                h.pump();
                check_invariants(&h);

                // Every connect/disconnect is preceded by a connecting of the same attempt.
                for event in h.events() {
                    match event {
                        TransportEvent::Connecting => attempt_open = true,
                        TransportEvent::Connect => prop_assert!(attempt_open),
                        TransportEvent::Disconnect(_) => {
                            prop_assert!(attempt_open);
                            attempt_open = false;
                        }
                        TransportEvent::Message(_) => prop_assert!(attempt_open),
                    }
                }
            }
        }
    }
}
