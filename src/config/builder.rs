//! Builder pattern for transport configuration.
//!
//! Provides a fluent API for configuring and creating [`Transport`] instances.
//!
//! # Example
//!
//! ```no_run
//! use ws_transport::Transport;
//!
//! # async fn example() -> ws_transport::Result<()> {
//! let transport = Transport::builder()
//!     .address("ws://localhost:8080/feed")
//!     .heartbeat(20_000, 15_000)
//!     .subprotocol("feedme")
//!     .build()?;
//!
//! transport.connect()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::socket::{SocketFactory, TungsteniteFactory};
use crate::transport::Transport;

use super::options::{TransportConfig, TransportOptions};

// ============================================================================
// TransportBuilder
// ============================================================================

/// Builder for configuring a [`Transport`] instance.
///
/// Use [`Transport::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct TransportBuilder {
    /// Server address.
    address: Option<String>,
    /// Transport options.
    options: TransportOptions,
    /// Socket factory. Defaults to [`TungsteniteFactory`].
    factory: Option<Arc<dyn SocketFactory>>,
}

impl fmt::Debug for TransportBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportBuilder")
            .field("address", &self.address)
            .field("options", &self.options)
            .field("custom_factory", &self.factory.is_some())
            .finish()
    }
}

// ============================================================================
// TransportBuilder Implementation
// ============================================================================

impl TransportBuilder {
    /// Creates a new builder with default options and no address.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server address (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets heartbeat interval and timeout in milliseconds.
    ///
    /// # Arguments
    ///
    /// * `interval_ms` - Time between probes, zero disables the heartbeat
    /// * `timeout_ms` - Time to wait for each pong, must be below `interval_ms`
    #[inline]
    #[must_use]
    pub fn heartbeat(mut self, interval_ms: u64, timeout_ms: u64) -> Self {
        self.options = self.options.with_heartbeat(interval_ms, timeout_ms);
        self
    }

    /// Sets the heartbeat interval in milliseconds. Zero disables it.
    #[inline]
    #[must_use]
    pub fn heartbeat_interval_ms(mut self, interval_ms: u64) -> Self {
        self.options.heartbeat_interval_ms = interval_ms;
        self
    }

    /// Sets the heartbeat timeout in milliseconds.
    #[inline]
    #[must_use]
    pub fn heartbeat_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.options.heartbeat_timeout_ms = timeout_ms;
        self
    }

    /// Disables the heartbeat.
    #[inline]
    #[must_use]
    pub fn no_heartbeat(mut self) -> Self {
        self.options = self.options.without_heartbeat();
        self
    }

    /// Adds a subprotocol to request.
    #[inline]
    #[must_use]
    pub fn subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.options = self.options.with_subprotocol(protocol);
        self
    }

    /// Adds several subprotocols, in preference order.
    #[must_use]
    pub fn subprotocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options
            .subprotocols
            .extend(protocols.into_iter().map(Into::into));
        self
    }

    /// Sets an option forwarded to the socket factory.
    #[inline]
    #[must_use]
    pub fn passthrough(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options = self.options.with_passthrough(key, value);
        self
    }

    /// Sets the socket factory.
    #[inline]
    #[must_use]
    pub fn factory(mut self, factory: impl SocketFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Builds the transport with validation.
    ///
    /// Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the address is missing or not a WebSocket URL
    /// - [`Error::Config`] if the options are invalid
    /// - [`Error::Config`] if no Tokio runtime is running
    pub fn build(self) -> Result<Transport> {
        let config = self.validate()?;
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(TungsteniteFactory::new()));

        Transport::new(config, factory)
    }

    /// Validates address and options.
    fn validate(&self) -> Result<TransportConfig> {
        let address = self
            .address
            .as_deref()
            .ok_or_else(|| Error::config("Transport address is required. Use .address()"))?;

        TransportConfig::new(address, self.options.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
