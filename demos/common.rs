//! Shared utilities for examples.
//!
//! Provides common functionality used across all examples:
//! - Command-line argument parsing
//! - Logging initialization
//! - Notification printing

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use tracing_subscriber::EnvFilter;
use ws_transport::TransportEvent;

// ============================================================================
// Constants
// ============================================================================

/// Public echo server used when no `--url` is given.
pub const DEFAULT_URL: &str = "wss://echo.websocket.org";

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for examples.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
    pub url: String,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let url = args
            .iter()
            .position(|a| a == "--url")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .unwrap_or_else(|| DEFAULT_URL.to_string());

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            url,
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        "ws_transport=trace"
    } else {
        "ws_transport=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

/// Print one notification.
pub fn print_event(event: &TransportEvent) {
    match event {
        TransportEvent::Connecting => println!("    ~ connecting"),
        TransportEvent::Connect => println!("    ✓ connected"),
        TransportEvent::Message(text) => println!("    < {text}"),
        TransportEvent::Disconnect(None) => println!("    ✗ disconnected"),
        TransportEvent::Disconnect(Some(err)) => println!("    ✗ disconnected: {err}"),
    }
}
