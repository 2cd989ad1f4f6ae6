//! WebSocket transport with a three-state connection model.
//!
//! This library wraps a WebSocket client socket behind a transport that
//! exposes exactly three states and four notifications, and detects dead
//! connections with a ping/pong heartbeat.
//!
//! # Architecture
//!
//! The transport follows a sans-IO core / thin driver split:
//!
//! - **Machine**: Reconciles transport state with the socket lifecycle
//! - **Event loop**: Feeds socket notifications and heartbeat deadlines in
//! - **Socket adapter**: Injected factory producing the actual sockets
//!
//! Key design principles:
//!
//! - The caller only ever sees `disconnected`, `connecting`, `connected`
//! - Usage errors are returned, transport failures are notified
//! - A reconnect never overlaps the previous socket's close handshake
//! - Notifications are queued, never delivered inside the causing call
//!
//! # Quick Start
//!
//! ```no_run
//! use ws_transport::{Result, Transport, TransportEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = Transport::builder()
//!         .address("ws://localhost:8080/feed")
//!         .heartbeat(5000, 4500)
//!         .build()?;
//!
//!     let mut events = transport.subscribe();
//!     transport.connect()?;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             TransportEvent::Connect => transport.send("hello")?,
//!             TransportEvent::Message(text) => println!("{text}"),
//!             TransportEvent::Disconnect(_) => break,
//!             TransportEvent::Connecting => {}
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Options, validation and [`TransportBuilder`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`socket`] | Socket contract and implementations |
//! | [`transport`] | State machine, heartbeat and [`Transport`] handle |

// ============================================================================
// Modules
// ============================================================================

/// Transport configuration.
///
/// Use [`Transport::builder()`] to create a configured transport.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Socket Adapter layer.
///
/// - [`SocketFactory`] - Creates sockets for the transport
/// - [`TungsteniteFactory`] - Native sockets over `tokio-tungstenite`
/// - [`MemoryFactory`] - Scriptable sockets for tests
pub mod socket;

/// WebSocket transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Config types
pub use config::{TransportBuilder, TransportConfig, TransportOptions};

// Error types
pub use error::{Error, Result};

// Socket types
pub use socket::{
    MemoryBehavior, MemoryFactory, MemoryPeer, Socket, SocketEvent, SocketEventSink,
    SocketFactory, SocketPayload, SocketPhase, SocketRequest, TungsteniteFactory,
};

// Transport types
pub use transport::{EventReceiver, Transport, TransportEvent, TransportState};
