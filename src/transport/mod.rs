//! WebSocket transport layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   lock    ┌─────────────────┐  create   ┌────────────────┐
//! │   Transport     │──────────►│     Machine     │──────────►│ SocketFactory  │
//! │  connect/send   │           │  state + hint   │           │   → Socket     │
//! └─────────────────┘           │  heartbeat      │           └───────┬────────┘
//!                               └────────▲────────┘                   │
//!                                        │ socket events, deadlines   │
//!                               ┌────────┴────────┐   SocketEnvelope  │
//!                               │   Event loop    │◄──────────────────┘
//!                               └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Transport::connect` - State becomes `Connecting`, socket created
//! 2. Socket `open` - State becomes `Connected`, heartbeat starts
//! 3. `Transport::send` / `message` notifications
//! 4. `Transport::disconnect` or a failure - State becomes `Disconnected`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Transport handle and event loop |
//! | `emitter` | Notifications and subscriber fan-out |
//! | `heartbeat` | Probe tick and timeout deadlines |
//! | `machine` | Connection state machine |
//! | `state` | Outward state and socket phase hint |

// ============================================================================
// Submodules
// ============================================================================

/// Transport handle and event loop.
pub mod connection;

/// Caller-visible notifications.
pub mod emitter;

/// Heartbeat monitor.
pub mod heartbeat;

/// Connection state machine.
pub mod machine;

/// Transport states.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Transport;
pub use emitter::{Emitter, EventReceiver, TransportEvent};
pub use heartbeat::{HeartbeatAction, HeartbeatMonitor};
pub use machine::Machine;
pub use state::{SocketPhaseHint, TransportState};
