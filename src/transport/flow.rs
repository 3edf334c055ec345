// BLE Flow Control - Request/acknowledge handshake for device-to-host data
//
// The firmware cannot push data over BLE. It parks outbound bytes behind the
// TX characteristic and coordinates with a one-byte flow-control register:
//
//   0 = idle, 1 = requested / acknowledged, 2 = transmission complete
//
// The host writes the payload byte by byte to RX, writes 1 to request a
// reply, then polls TX (acknowledging every read with another 1) until the
// register reads 2 or the poll budget runs out.

use crate::transport::ble::BleProfile;
use crate::transport::{BleLink, TransportError};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tracing::{debug, trace, warn};

// ============================================================================
// FLOW CONFIG
// ============================================================================

/// Timing of the flow-control handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Delay after every single-byte RX write
    pub pacing_ms: u64,
    /// Delay after requesting transmission, before the first poll
    pub request_settle_ms: u64,
    /// Delay between polls
    pub poll_interval_ms: u64,
    /// Poll iterations before the exchange is declared timed out
    pub max_polls: u32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 10,
            request_settle_ms: 100,
            poll_interval_ms: 10,
            max_polls: 80,
        }
    }
}

impl FlowConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pacing_ms(mut self, ms: u64) -> Self {
        self.pacing_ms = ms;
        self
    }

    pub fn with_request_settle_ms(mut self, ms: u64) -> Self {
        self.request_settle_ms = ms;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_polls(mut self, polls: u32) -> Self {
        self.max_polls = polls;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.max_polls == 0 {
            return Err(TransportError::InvalidConfig("max_polls cannot be 0".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// FLOW STATE
// ============================================================================

/// Host-side view of the flow-control register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowState {
    Idle,
    Requested,
    Complete,
}

impl Default for FlowState {
    fn default() -> Self {
        Self::Idle
    }
}

impl FlowState {
    /// Decode a register byte. Unknown values yield None.
    pub fn from_register(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::Requested),
            2 => Some(Self::Complete),
            _ => None,
        }
    }

    /// Register byte for this state
    pub fn register_value(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Requested => 1,
            Self::Complete => 2,
        }
    }

    /// Check if transition to another state is valid
    pub fn can_transition_to(&self, target: &FlowState) -> bool {
        match (self, target) {
            (Self::Idle, Self::Requested) => true,
            (Self::Requested, Self::Requested) => true, // Per-chunk acknowledge
            (Self::Requested, Self::Complete) => true,
            (Self::Requested, Self::Idle) => true, // Device reset its register
            (Self::Complete, Self::Idle) => true,
            (Self::Complete, Self::Requested) => true, // Next exchange
            (a, b) => a == b,
        }
    }
}

// ============================================================================
// POLL OUTCOME
// ============================================================================

/// How a poll loop ended. Every loop ends in exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Register reached Complete after data arrived
    Complete(Vec<u8>),
    /// Register reached Complete without any data
    Empty,
    /// Poll budget exhausted; whatever arrived is kept
    TimedOut(Vec<u8>),
}

impl PollOutcome {
    pub fn data(&self) -> &[u8] {
        match self {
            Self::Complete(data) | Self::TimedOut(data) => data,
            Self::Empty => &[],
        }
    }

    pub fn into_data(self) -> Vec<u8> {
        match self {
            Self::Complete(data) | Self::TimedOut(data) => data,
            Self::Empty => Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !matches!(self, Self::TimedOut(_))
    }
}

// ============================================================================
// FLOW CONTROLLER
// ============================================================================

/// Drives the flow-control handshake over a BLE link
#[derive(Debug, Clone)]
pub struct FlowController {
    config: FlowConfig,
    profile: BleProfile,
    state: FlowState,
}

impl FlowController {
    pub fn new(config: FlowConfig, profile: BleProfile) -> Self {
        Self {
            config,
            profile,
            state: FlowState::Idle,
        }
    }

    /// Last register state observed or written
    pub fn state(&self) -> FlowState {
        self.state
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    fn enter(&mut self, next: FlowState) {
        if next != self.state {
            if !self.state.can_transition_to(&next) {
                warn!(from = ?self.state, to = ?next, "unexpected flow-control transition");
            }
            debug!(from = ?self.state, to = ?next, "flow-control state changed");
        }
        self.state = next;
    }

    /// Write the payload one byte per RX write, pacing each write
    pub async fn write_paced(
        &mut self,
        link: &mut dyn BleLink,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        for byte in payload {
            link.write(self.profile.rx_uuid, &[*byte])
                .await
                .map_err(|e| TransportError::SendFailed(format!("RX write: {}", e)))?;
            trace!(byte = *byte, "RX byte written");
            sleep(Duration::from_millis(self.config.pacing_ms)).await;
        }
        Ok(())
    }

    /// Ask the device to start transmitting, then let it settle
    pub async fn request(&mut self, link: &mut dyn BleLink) -> Result<(), TransportError> {
        self.write_register(link, FlowState::Requested).await?;
        sleep(Duration::from_millis(self.config.request_settle_ms)).await;
        Ok(())
    }

    /// Acknowledge a received chunk
    pub async fn acknowledge(&mut self, link: &mut dyn BleLink) -> Result<(), TransportError> {
        self.write_register(link, FlowState::Requested).await
    }

    async fn write_register(
        &mut self,
        link: &mut dyn BleLink,
        state: FlowState,
    ) -> Result<(), TransportError> {
        link.write(self.profile.flow_uuid, &[state.register_value()])
            .await
            .map_err(|e| TransportError::SendFailed(format!("flow-control write: {}", e)))?;
        self.enter(state);
        Ok(())
    }

    /// One poll iteration: drain TX into `buffer` (acknowledging data), then
    /// sample the register. Read failures count as "nothing yet".
    pub async fn poll_once(&mut self, link: &mut dyn BleLink, buffer: &mut Vec<u8>) -> FlowState {
        match link.read(self.profile.tx_uuid).await {
            Ok(data) if !data.is_empty() => {
                buffer.extend_from_slice(&data);
                if let Err(e) = self.acknowledge(link).await {
                    debug!(error = %e, "acknowledge failed");
                }
            }
            Ok(_) => {}
            Err(e) => trace!(error = %e, "no TX data yet"),
        }

        match link.read(self.profile.flow_uuid).await {
            Ok(value) => match value.first().copied().map(|b| (b, FlowState::from_register(b))) {
                Some((_, Some(state))) => self.enter(state),
                Some((raw, None)) => debug!(raw, "ignoring unknown flow-control value"),
                None => trace!("empty flow-control read"),
            },
            Err(e) => debug!(error = %e, "flow-control read failed"),
        }

        self.state
    }

    /// Poll until the device reports Complete or the budget runs out
    pub async fn poll(&mut self, link: &mut dyn BleLink) -> PollOutcome {
        let mut buffer = Vec::new();

        for attempt in 1..=self.config.max_polls {
            if self.poll_once(link, &mut buffer).await == FlowState::Complete {
                debug!(attempt, bytes = buffer.len(), "transmission complete");
                return if buffer.is_empty() {
                    PollOutcome::Empty
                } else {
                    PollOutcome::Complete(buffer)
                };
            }
            if attempt % 5 == 0 {
                trace!(attempt, max = self.config.max_polls, "polling");
            }
            sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
        }

        warn!(
            polls = self.config.max_polls,
            bytes = buffer.len(),
            "flow-control poll budget exhausted"
        );
        PollOutcome::TimedOut(buffer)
    }

    /// Full exchange: paced payload, transmission request, poll loop
    pub async fn exchange(
        &mut self,
        link: &mut dyn BleLink,
        payload: &[u8],
    ) -> Result<PollOutcome, TransportError> {
        self.write_paced(link, payload).await?;
        self.request(link).await?;
        Ok(self.poll(link).await)
    }
}
