//! Error types for the WebSocket transport.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Error Channels
//!
//! Errors travel on two disjoint channels:
//!
//! - **Usage errors** are returned synchronously from the offending call
//!   ([`Error::InvalidArgument`], [`Error::InvalidState`], [`Error::Config`]).
//! - **Transport failures** are never returned from a call. They arrive as
//!   the payload of a [`TransportEvent::Disconnect`] notification.
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Usage | [`Error::InvalidArgument`], [`Error::InvalidState`] |
//! | Configuration | [`Error::Config`] |
//! | Transport failure | [`Error::SocketCreation`], [`Error::ConnectFailed`], [`Error::UnexpectedClose`], [`Error::HeartbeatTimeout`], [`Error::PingFailed`], [`Error::SendFailed`], [`Error::NonTextMessage`] |
//! | Caller | [`Error::Application`] |
//! | External | [`Error::WebSocket`], [`Error::Json`] |
//!
//! Every variant maps to a stable machine-checkable [`Error::code`], and the
//! `Display` output of usage and transport errors starts with `"<CODE>: "`.
//!
//! [`TransportEvent::Disconnect`]: crate::transport::TransportEvent::Disconnect

// ============================================================================
// Imports
// ============================================================================

use std::error::Error as StdError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Codes
// ============================================================================

/// Code for invalid arguments passed by the caller.
pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";

/// Code for calls made in the wrong transport state.
pub const INVALID_STATE: &str = "INVALID_STATE";

/// Code for every asynchronous transport failure.
pub const TRANSPORT_FAILURE: &str = "TRANSPORT_FAILURE";

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Usage Errors
    // ========================================================================
    /// Invalid argument.
    ///
    /// Returned when a value handed to the transport or an adapter is malformed.
    #[error("INVALID_ARGUMENT: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Operation not allowed in the current state.
    #[error("INVALID_STATE: {message}")]
    InvalidState {
        /// Description of the state violation.
        message: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned by the builder when options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Transport Failures
    // ========================================================================
    /// The socket factory refused to create a socket.
    #[error("TRANSPORT_FAILURE: Could not create the WebSocket: {cause}")]
    SocketCreation {
        /// Underlying construction error.
        cause: String,
    },

    /// The socket closed before the handshake completed.
    #[error("TRANSPORT_FAILURE: Could not connect to the WebSocket server (code {code})")]
    ConnectFailed {
        /// Close code reported by the socket.
        code: u16,
        /// Close reason reported by the socket.
        reason: String,
    },

    /// The socket closed while the transport was connected.
    #[error("TRANSPORT_FAILURE: The WebSocket closed unexpectedly (code {code})")]
    UnexpectedClose {
        /// Close code reported by the socket.
        code: u16,
        /// Close reason reported by the socket.
        reason: String,
    },

    /// No pong arrived within the heartbeat timeout.
    #[error("TRANSPORT_FAILURE: The WebSocket heartbeat failed (no pong within {timeout_ms}ms)")]
    HeartbeatTimeout {
        /// Milliseconds waited for the pong.
        timeout_ms: u64,
    },

    /// The heartbeat ping could not be transmitted.
    #[error("TRANSPORT_FAILURE: The WebSocket heartbeat failed: {cause}")]
    PingFailed {
        /// Underlying socket error.
        cause: String,
    },

    /// An outbound frame could not be transmitted.
    #[error("TRANSPORT_FAILURE: WebSocket transmission failed: {cause}")]
    SendFailed {
        /// Underlying socket error.
        cause: String,
    },

    /// The peer sent a binary frame.
    #[error("TRANSPORT_FAILURE: Received non-string message on WebSocket connection")]
    NonTextMessage,

    // ========================================================================
    // Caller Errors
    // ========================================================================
    /// Error supplied by the caller to `disconnect`.
    #[error("{0}")]
    Application(Box<dyn StdError + Send + Sync>),

    // ========================================================================
    // External Errors
    // ========================================================================
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    #[inline]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a socket creation error.
    #[inline]
    pub fn socket_creation(cause: impl Into<String>) -> Self {
        Self::SocketCreation {
            cause: cause.into(),
        }
    }

    /// Creates a connect failure from a close notification.
    #[inline]
    pub fn connect_failed(code: u16, reason: impl Into<String>) -> Self {
        Self::ConnectFailed {
            code,
            reason: reason.into(),
        }
    }

    /// Creates an unexpected close error from a close notification.
    #[inline]
    pub fn unexpected_close(code: u16, reason: impl Into<String>) -> Self {
        Self::UnexpectedClose {
            code,
            reason: reason.into(),
        }
    }

    /// Creates a heartbeat timeout error.
    #[inline]
    pub fn heartbeat_timeout(timeout_ms: u64) -> Self {
        Self::HeartbeatTimeout { timeout_ms }
    }

    /// Creates a ping failure error.
    #[inline]
    pub fn ping_failed(cause: impl Into<String>) -> Self {
        Self::PingFailed {
            cause: cause.into(),
        }
    }

    /// Creates a send failure error.
    #[inline]
    pub fn send_failed(cause: impl Into<String>) -> Self {
        Self::SendFailed {
            cause: cause.into(),
        }
    }

    /// Wraps a caller-supplied error.
    #[inline]
    pub fn application(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Application(err.into())
    }
}

// ============================================================================
// Error Accessors
// ============================================================================

impl Error {
    /// Returns the stable machine-checkable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { .. } => INVALID_ARGUMENT,
            Self::InvalidState { .. } => INVALID_STATE,
            Self::Config { .. } => "CONFIG",
            Self::SocketCreation { .. }
            | Self::ConnectFailed { .. }
            | Self::UnexpectedClose { .. }
            | Self::HeartbeatTimeout { .. }
            | Self::PingFailed { .. }
            | Self::SendFailed { .. }
            | Self::NonTextMessage => TRANSPORT_FAILURE,
            Self::Application(_) => "APPLICATION",
            Self::WebSocket(_) => "WEBSOCKET",
            Self::Json(_) => "JSON",
        }
    }

    /// Returns the close code carried by a close-derived failure.
    #[inline]
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::ConnectFailed { code, .. } | Self::UnexpectedClose { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns the close reason carried by a close-derived failure.
    #[inline]
    #[must_use]
    pub fn close_reason(&self) -> Option<&str> {
        match self {
            Self::ConnectFailed { reason, .. } | Self::UnexpectedClose { reason, .. } => {
                Some(reason)
            }
            _ => None,
        }
    }

    /// Returns the lower-level cause of a socket-reported failure.
    #[inline]
    #[must_use]
    pub fn cause(&self) -> Option<&str> {
        match self {
            Self::SocketCreation { cause }
            | Self::PingFailed { cause }
            | Self::SendFailed { cause } => Some(cause),
            _ => None,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error is caller misuse.
    #[inline]
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. } | Self::InvalidState { .. }
        )
    }

    /// Returns `true` if this is an asynchronous transport failure.
    #[inline]
    #[must_use]
    pub fn is_transport_failure(&self) -> bool {
        self.code() == TRANSPORT_FAILURE
    }

    /// Returns `true` if the heartbeat detected a dead connection.
    #[inline]
    #[must_use]
    pub fn is_heartbeat_failure(&self) -> bool {
        matches!(
            self,
            Self::HeartbeatTimeout { .. } | Self::PingFailed { .. }
        )
    }

    /// Returns `true` if the socket closed without the transport asking it to.
    #[inline]
    #[must_use]
    pub fn is_close_failure(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed { .. } | Self::UnexpectedClose { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
