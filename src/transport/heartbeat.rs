//! Heartbeat monitor for connected transports.
//!
//! # Probe Cycle
//!
//! ```text
//!  connected        tick                      tick
//!      │  interval   │  interval               │
//!      ├────────────►├────────────────────────►├──► ...
//!                    │ arm timeout, ping
//!                    ├── pong ──► disarm       (healthy)
//!                    ├── ping fails ──────────► failure path
//!                    └── timeout elapses ─────► failure path
//! ```
//!
//! The monitor owns no timers of its own. It keeps two deadlines, the
//! recurring probe tick and the one-shot probe timeout, and the transport's
//! event loop sleeps until the earliest of them. A cancelled deadline is
//! simply cleared, so a cancelled timer can never fire.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

// ============================================================================
// HeartbeatAction
// ============================================================================

/// What the transport must do after polling the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing is due.
    Idle,
    /// Send a ping now. The probe timeout is already armed.
    Probe,
    /// The outstanding probe timed out.
    TimedOut,
}

// ============================================================================
// HeartbeatMonitor
// ============================================================================

/// Liveness probe state for one transport.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    interval: Duration,
    timeout: Duration,
    /// Next probe tick. Present only while running.
    next_probe_at: Option<Instant>,
    /// Deadline of the outstanding probe.
    probe_deadline: Option<Instant>,
}

impl HeartbeatMonitor {
    /// Creates a stopped monitor. A zero `interval` disables it.
    #[must_use]
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            next_probe_at: None,
            probe_deadline: None,
        }
    }

    /// Returns `true` if the heartbeat is configured.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Returns `true` while the recurring tick is scheduled.
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.next_probe_at.is_some()
    }

    /// Returns `true` while a probe awaits its pong.
    #[inline]
    #[must_use]
    pub fn is_probing(&self) -> bool {
        self.probe_deadline.is_some()
    }

    /// Returns the probe timeout in milliseconds, saturating at `u64::MAX`.
    #[inline]
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }

    /// Schedules the first tick one interval after `now`.
    pub fn start(&mut self, now: Instant) {
        if !self.is_enabled() {
            return;
        }
        self.next_probe_at = Some(now + self.interval);
        self.probe_deadline = None;
        debug!(interval = ?self.interval, timeout = ?self.timeout, "Heartbeat started");
    }

    /// Cancels the tick and any outstanding probe.
    pub fn stop(&mut self) {
        if self.next_probe_at.take().is_some() {
            debug!("Heartbeat stopped");
        }
        self.probe_deadline = None;
    }

    /// Records a pong. Returns `true` if it answered an outstanding probe.
    pub fn pong_received(&mut self) -> bool {
        let answered = self.probe_deadline.take().is_some();
        trace!(answered, "Pong received");
        answered
    }

    /// Returns the earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.next_probe_at, self.probe_deadline) {
            (Some(tick), Some(deadline)) => Some(tick.min(deadline)),
            (tick, deadline) => tick.or(deadline),
        }
    }

    /// Advances the monitor to `now`.
    ///
    /// A timeout takes precedence over a tick due at the same instant.
    pub fn poll(&mut self, now: Instant) -> HeartbeatAction {
        if let Some(deadline) = self.probe_deadline
            && now >= deadline
        {
            self.stop();
            return HeartbeatAction::TimedOut;
        }

        match self.next_probe_at {
            Some(tick) if now >= tick => {
                self.next_probe_at = Some(now + self.interval);
                if self.probe_deadline.is_some() {
                    trace!("Probe still outstanding, tick skipped");
                    return HeartbeatAction::Idle;
                }
                self.probe_deadline = Some(now + self.timeout);
                trace!("Heartbeat probe");
                HeartbeatAction::Probe
            }
            _ => HeartbeatAction::Idle,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
