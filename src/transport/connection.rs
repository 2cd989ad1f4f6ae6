//! Transport handle and event loop.
//!
//! [`Transport`] wraps a [`Machine`] in a mutex shared with a spawned
//! event loop task.
//!
//! # Event Loop
//!
//! The transport spawns a tokio task that handles:
//!
//! - Notifications from the current and previous sockets
//! - Heartbeat probe ticks and probe timeouts
//!
//! Caller operations lock the machine directly, so state transitions made
//! by `connect`/`disconnect` are visible as soon as the call returns.
//! Notifications are delivered through subscriber channels, never from
//! inside the call that caused them.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};
use url::Url;

use crate::config::{TransportBuilder, TransportConfig};
use crate::error::{Error, Result};
use crate::socket::{SocketEventReceiver, SocketFactory};

use super::emitter::EventReceiver;
use super::machine::Machine;
use super::state::TransportState;

// ============================================================================
// Transport
// ============================================================================

/// WebSocket transport with a three-state connection model.
///
/// # Thread Safety
///
/// `Transport` is `Send + Sync` and can be shared across tasks behind an
/// `Arc`. All operations are non-blocking.
///
/// # Shutdown
///
/// Dropping the transport stops its event loop and drops the current
/// socket.
pub struct Transport {
    /// Server address.
    address: Url,
    /// State machine (shared with event loop).
    machine: Arc<Mutex<Machine>>,
    /// Event loop task.
    event_loop: JoinHandle<()>,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("address", &self.address.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Creates a new transport builder.
    #[inline]
    #[must_use]
    pub fn builder() -> TransportBuilder {
        TransportBuilder::new()
    }

    /// Creates a disconnected transport.
    ///
    /// Spawns the event loop task internally.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if called outside a Tokio runtime.
    pub fn new(config: TransportConfig, factory: Arc<dyn SocketFactory>) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|_| Error::config("Transport must be created inside a Tokio runtime"))?;

        let (socket_tx, socket_rx) = mpsc::unbounded_channel();
        let machine = Arc::new(Mutex::new(Machine::new(&config, factory, socket_tx)));

        let event_loop = runtime.spawn(run_event_loop(Arc::clone(&machine), socket_rx));

        debug!(address = %config.address, "Transport created");

        Ok(Self {
            address: config.address,
            machine,
            event_loop,
        })
    }

    /// Returns the server address.
    #[inline]
    #[must_use]
    pub fn address(&self) -> &Url {
        &self.address
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransportState {
        self.machine.lock().state()
    }

    /// Subscribes to notifications emitted from now on.
    pub fn subscribe(&self) -> EventReceiver {
        self.machine.lock().subscribe()
    }

    /// Starts connecting.
    ///
    /// The state is `Connecting` when this returns. The outcome arrives as
    /// a `connect` or `disconnect` notification.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless disconnected.
    pub fn connect(&self) -> Result<()> {
        self.machine.lock().connect()
    }

    /// Disconnects.
    ///
    /// The state is `Disconnected` when this returns. The `disconnect`
    /// notification carries `error` unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if already disconnected.
    pub fn disconnect(&self, error: Option<Error>) -> Result<()> {
        self.machine.lock().disconnect(error)
    }

    /// Sends a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless connected.
    pub fn send(&self, frame: impl Into<String>) -> Result<()> {
        self.machine.lock().send(frame.into())
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

// ============================================================================
// Event Loop
// ============================================================================

/// Feeds socket notifications and due deadlines into the machine.
async fn run_event_loop(machine: Arc<Mutex<Machine>>, mut socket_rx: SocketEventReceiver) {
    loop {
        let deadline = machine.lock().next_deadline();

        tokio::select! {
            envelope = socket_rx.recv() => {
                match envelope {
                    Some(envelope) => {
                        machine.lock().handle_socket_event(envelope, Instant::now());
                    }
                    None => {
                        debug!("Socket channel closed");
                        break;
                    }
                }
            }

            () = sleep_until_deadline(deadline) => {
                trace!("Heartbeat deadline reached");
                machine.lock().handle_timers(Instant::now());
            }
        }
    }

    debug!("Event loop terminated");
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================
