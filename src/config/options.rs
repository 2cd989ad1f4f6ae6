//! Transport options and validated configuration.
//!
//! Provides a type-safe interface for the heartbeat, subprotocol and
//! passthrough settings of a transport. Options deserialize from JSON, so
//! they can live in an application's config file.
//!
//! # Example
//!
//! ```ignore
//! use ws_transport::TransportOptions;
//!
//! let options = TransportOptions::new()
//!     .with_heartbeat(20_000, 15_000)
//!     .with_subprotocol("feedme");
//!
//! let options = TransportOptions::from_json(r#"{ "heartbeat_interval_ms": 0 }"#)?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};
use crate::socket::{PassthroughOptions, SocketRequest};

// ============================================================================
// Constants
// ============================================================================

/// Default heartbeat interval.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5000;

/// Default heartbeat timeout.
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 4500;

// ============================================================================
// TransportOptions
// ============================================================================

/// Transport configuration options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportOptions {
    /// Milliseconds between heartbeat probes. Zero disables the heartbeat.
    pub heartbeat_interval_ms: u64,

    /// Milliseconds to wait for a pong after each probe.
    pub heartbeat_timeout_ms: u64,

    /// WebSocket subprotocols to request, in preference order.
    pub subprotocols: Vec<String>,

    /// Options forwarded opaquely to the socket factory.
    pub passthrough: PassthroughOptions,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl TransportOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            heartbeat_timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
            subprotocols: Vec::new(),
            passthrough: PassthroughOptions::new(),
        }
    }

    /// Parses options from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the JSON is malformed or has unknown fields
    /// - [`Error::Config`] if the values fail validation
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl TransportOptions {
    /// Sets heartbeat interval and timeout in milliseconds.
    #[inline]
    #[must_use]
    pub fn with_heartbeat(mut self, interval_ms: u64, timeout_ms: u64) -> Self {
        self.heartbeat_interval_ms = interval_ms;
        self.heartbeat_timeout_ms = timeout_ms;
        self
    }

    /// Disables the heartbeat.
    #[inline]
    #[must_use]
    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat_interval_ms = 0;
        self
    }

    /// Adds a subprotocol.
    #[inline]
    #[must_use]
    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocols.push(protocol.into());
        self
    }

    /// Sets a passthrough option.
    #[inline]
    #[must_use]
    pub fn with_passthrough(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.passthrough.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Accessors / Validation
// ============================================================================

impl TransportOptions {
    /// Returns the heartbeat interval.
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Returns the heartbeat timeout.
    #[inline]
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Returns `true` if the heartbeat is enabled.
    #[inline]
    #[must_use]
    pub fn heartbeat_enabled(&self) -> bool {
        self.heartbeat_interval_ms > 0
    }

    /// Checks the heartbeat settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a subprotocol is empty or contains a
    /// separator, or if the heartbeat is enabled and the timeout is zero or
    /// not strictly less than the interval.
    pub fn validate(&self) -> Result<()> {
        for protocol in &self.subprotocols {
            if protocol.is_empty() || protocol.contains([',', ' ']) {
                return Err(Error::config(format!("invalid subprotocol: {protocol:?}")));
            }
        }

        if !self.heartbeat_enabled() {
            return Ok(());
        }

        if self.heartbeat_timeout_ms == 0 {
            return Err(Error::config(
                "heartbeat_timeout_ms must be positive when the heartbeat is enabled",
            ));
        }

        if self.heartbeat_timeout_ms >= self.heartbeat_interval_ms {
            return Err(Error::config(format!(
                "heartbeat_timeout_ms ({}) must be less than heartbeat_interval_ms ({})",
                self.heartbeat_timeout_ms, self.heartbeat_interval_ms
            )));
        }

        Ok(())
    }
}

// ============================================================================
// TransportConfig
// ============================================================================

/// Validated configuration a transport is constructed from.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// Server address.
    pub address: Url,
    /// Validated options.
    pub options: TransportOptions,
}

impl TransportConfig {
    /// Validates `address` and `options`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the address is not a `ws`/`wss` URL or
    /// the options are invalid.
    pub fn new(address: &str, options: TransportOptions) -> Result<Self> {
        let address = Url::parse(address)
            .map_err(|e| Error::config(format!("invalid address {address:?}: {e}")))?;

        if !matches!(address.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "address scheme must be ws or wss, got {}",
                address.scheme()
            )));
        }

        options.validate()?;

        Ok(Self { address, options })
    }

    /// Returns the request handed to the socket factory.
    #[must_use]
    pub fn socket_request(&self) -> SocketRequest {
        SocketRequest {
            address: self.address.clone(),
            subprotocols: self.options.subprotocols.clone(),
            passthrough: self.options.passthrough.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
