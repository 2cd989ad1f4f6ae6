//! Transport configuration.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `options` | Options, defaults and validation |
//! | `builder` | Fluent [`TransportBuilder`] |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent transport builder.
pub mod builder;

/// Transport options and validated configuration.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::TransportBuilder;
pub use options::{
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_HEARTBEAT_TIMEOUT_MS, TransportConfig, TransportOptions,
};
