//! Socket Adapter layer.
//!
//! The transport never talks to a WebSocket library directly. It creates
//! sockets through an injected [`SocketFactory`] and consumes their
//! notifications as [`SocketEvent`]s.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `adapter` | The socket contract shared by every implementation |
//! | `memory` | Scriptable in-process sockets for tests |
//! | `tungstenite` | Native sockets over `tokio-tungstenite` |

// ============================================================================
// Submodules
// ============================================================================

/// Socket contract: trait, phases, events, sink.
pub mod adapter;

/// Scriptable in-memory sockets.
pub mod memory;

/// Sockets backed by `tokio-tungstenite`.
pub mod tungstenite;

// ============================================================================
// Re-exports
// ============================================================================

pub use adapter::{
    CLOSE_ABNORMAL, CLOSE_NO_STATUS, CLOSE_NORMAL, PassthroughOptions, SharedPhase, Socket,
    SocketEnvelope, SocketEvent, SocketEventReceiver, SocketEventSink, SocketFactory, SocketId,
    SocketPayload, SocketPhase, SocketRequest,
};
pub use memory::{MemoryBehavior, MemoryFactory, MemoryPeer};
pub use tungstenite::TungsteniteFactory;
