//! Caller-visible notifications and their delivery.
//!
//! Notifications are never delivered inside the call that caused them.
//! [`Emitter::emit`] only queues the event on each subscriber's channel; the
//! subscriber sees it the next time it polls its receiver. Events queued in
//! one call arrive in the order they were queued.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::Error;

// ============================================================================
// Types
// ============================================================================

/// Receiver of transport notifications.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

// ============================================================================
// TransportEvent
// ============================================================================

/// Notification delivered to transport subscribers.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A connection attempt started.
    Connecting,
    /// The transport is connected.
    Connect,
    /// A text frame arrived.
    Message(String),
    /// The transport is disconnected.
    ///
    /// Carries the failure, or the error passed to `disconnect`, if any.
    Disconnect(Option<Arc<Error>>),
}

impl TransportEvent {
    /// Returns the notification name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connect => "connect",
            Self::Message(_) => "message",
            Self::Disconnect(_) => "disconnect",
        }
    }

    /// Returns the error carried by a `Disconnect`.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Disconnect(Some(err)) => Some(err),
            _ => None,
        }
    }
}

// ============================================================================
// Emitter
// ============================================================================

/// Fans notifications out to every live subscriber.
#[derive(Debug, Default)]
pub struct Emitter {
    subscribers: Vec<mpsc::UnboundedSender<TransportEvent>>,
}

impl Emitter {
    /// Creates an emitter with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber. It sees notifications queued from now on.
    pub fn subscribe(&mut self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.iter().filter(|tx| !tx.is_closed()).count()
    }

    /// Queues `event` for every subscriber, dropping closed ones.
    pub fn emit(&mut self, event: TransportEvent) {
        trace!(event = event.name(), "Queue notification");
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

// ============================================================================
// Tests
// ============================================================================
