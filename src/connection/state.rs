// Connection State - Lifecycle phases and retry bookkeeping

use crate::transport::TransportKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Duration;
use tracing::warn;

// ============================================================================
// CONNECTION PHASE
// ============================================================================

/// Lifecycle phase of the device connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Verifying,
    Connected,
    Reconnecting,
}

impl Default for ConnectionPhase {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl ConnectionPhase {
    /// Check if transition to another state is valid
    pub fn can_transition_to(&self, target: &ConnectionPhase) -> bool {
        match (self, target) {
            (Self::Disconnected, Self::Connecting) => true,
            (Self::Connecting, Self::Verifying) => true,
            (Self::Verifying, Self::Connected) => true,
            (Self::Connected, Self::Connecting) => true, // Switching endpoint
            (Self::Reconnecting, Self::Connecting) => true,
            (Self::Connecting | Self::Verifying | Self::Connected, Self::Reconnecting) => true,
            (_, Self::Disconnected) => true, // Explicit disconnect or terminal failure
            _ => false,
        }
    }

    /// Check if the connection is active (not fully disconnected)
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Verifying => "verifying",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(label)
    }
}

// ============================================================================
// CONNECTION STATE
// ============================================================================

/// Snapshot of the connection, owned and mutated by the ConnectionManager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    active_transport: Option<TransportKind>,
    phase: ConnectionPhase,
    retry_count: u32,
    max_retries: u32,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(3)
    }
}

impl ConnectionState {
    pub fn new(max_retries: u32) -> Self {
        Self {
            active_transport: None,
            phase: ConnectionPhase::Disconnected,
            retry_count: 0,
            max_retries,
        }
    }

    pub fn active_transport(&self) -> Option<TransportKind> {
        self.active_transport
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected && self.active_transport.is_some()
    }

    /// Another automatic reconnect is allowed
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub(crate) fn set_phase(&mut self, next: ConnectionPhase) {
        if next != self.phase && !self.phase.can_transition_to(&next) {
            warn!(from = %self.phase, to = %next, "unexpected connection transition");
        }
        self.phase = next;
    }

    /// Start an attempt over `kind`
    pub(crate) fn begin(&mut self, kind: TransportKind) {
        self.active_transport = Some(kind);
        self.set_phase(ConnectionPhase::Connecting);
    }

    pub(crate) fn mark_connected(&mut self) {
        self.set_phase(ConnectionPhase::Connected);
        self.retry_count = 0;
    }

    /// Count a retry and enter Reconnecting. Returns the attempt number.
    pub(crate) fn schedule_retry(&mut self) -> u32 {
        self.retry_count += 1;
        self.set_phase(ConnectionPhase::Reconnecting);
        self.retry_count
    }

    /// Back to the initial disconnected state
    pub(crate) fn reset(&mut self) {
        self.active_transport = None;
        self.phase = ConnectionPhase::Disconnected;
        self.retry_count = 0;
    }
}

// ============================================================================
// RETRY DECISION
// ============================================================================

/// What the manager decided after a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// A reconnect to the last endpoint is scheduled after `delay`
    Retry { attempt: u32, delay: Duration },
    /// Retries are exhausted or cannot help; the connection is down
    GiveUp,
    /// The device can never work with this host
    Fatal,
}
