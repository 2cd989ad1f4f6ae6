//! Outward transport state and the internal socket phase hint.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;

// ============================================================================
// TransportState
// ============================================================================

/// Connection state visible to the transport's caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    /// No connection, no attempt in progress.
    #[default]
    Disconnected,
    /// An attempt is in progress.
    Connecting,
    /// Frames may be sent.
    Connected,
}

impl TransportState {
    /// Returns the lowercase state name.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }

    /// Returns `true` if disconnected.
    #[inline]
    #[must_use]
    pub const fn is_disconnected(self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Returns `true` if connected.
    #[inline]
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SocketPhaseHint
// ============================================================================

/// What the current or most recently abandoned socket was last doing.
///
/// Used only to interpret that socket's `close` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SocketPhaseHint {
    /// No socket.
    #[default]
    None,
    /// Handshake in flight.
    Connecting,
    /// Socket backs a connected transport.
    Connected,
    /// The transport asked the socket to go away.
    Disconnecting,
}

// ============================================================================
// Tests
// ============================================================================
