// Connection Manager - Owns the transport handle and the connection lifecycle
//
// Disconnected -> Connecting -> Verifying -> Connected -> (Disconnected | Reconnecting)
//
// Failures are classified: an incompatible device or missing hardware is
// fatal, anything else earns a delayed reconnect to the last endpoint until
// max_retries is spent.

use crate::connection::state::{ConnectionPhase, ConnectionState, RetryDecision};
use crate::protocol::Command;
use crate::transport::{
    BleProfile, BleTransport, Connector, Endpoint, FlowConfig, Reply, Transport, TransportError,
    UartConfig, UartTransport,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, error, info, warn};

// ============================================================================
// CONNECTION CONFIG
// ============================================================================

/// Configuration for the connection lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Automatic reconnects after the initial attempt
    pub max_retries: u32,
    /// Delay before a scheduled reconnect, in milliseconds
    pub reconnect_delay_ms: u64,
    /// Budget for opening and verifying a link, in milliseconds
    pub connect_timeout_ms: u64,
    /// UART read timing
    pub uart: UartConfig,
    /// BLE flow-control timing
    pub flow: FlowConfig,
    /// BLE service layout
    pub profile: BleProfile,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            reconnect_delay_ms: 1000,
            connect_timeout_ms: 30_000,
            uart: UartConfig::default(),
            flow: FlowConfig::default(),
            profile: BleProfile::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.reconnect_delay_ms = ms;
        self
    }

    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    pub fn with_uart(mut self, uart: UartConfig) -> Self {
        self.uart = uart;
        self
    }

    pub fn with_flow(mut self, flow: FlowConfig) -> Self {
        self.flow = flow;
        self
    }

    pub fn with_profile(mut self, profile: BleProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.connect_timeout_ms == 0 {
            return Err(TransportError::InvalidConfig(
                "connect_timeout_ms cannot be 0".to_string(),
            ));
        }
        self.uart.validate()?;
        self.flow.validate()
    }
}

// ============================================================================
// CONNECTION MANAGER
// ============================================================================

/// Single owner of the transport handle
pub struct ConnectionManager {
    config: ConnectionConfig,
    connector: Box<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    state: ConnectionState,
    last_endpoint: Option<Endpoint>,
    reconnect_at: Option<Instant>,
}

impl ConnectionManager {
    pub fn new(connector: Box<dyn Connector>, config: ConnectionConfig) -> Self {
        Self {
            state: ConnectionState::new(config.max_retries),
            config,
            connector,
            transport: None,
            last_endpoint: None,
            reconnect_at: None,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected() && self.transport.is_some()
    }

    /// Endpoint of the latest connect, target of scheduled reconnects
    pub fn last_endpoint(&self) -> Option<&Endpoint> {
        self.last_endpoint.as_ref()
    }

    /// When the pending reconnect is due, if one is scheduled
    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn reconnect_due(&self, now: Instant) -> bool {
        self.reconnect_at.map_or(false, |at| now >= at)
    }

    /// Connect to `endpoint`, replacing any current link. On success the
    /// device clock is set from `now`.
    pub async fn connect(
        &mut self,
        endpoint: Endpoint,
        now: NaiveDateTime,
    ) -> Result<(), TransportError> {
        self.close_transport().await;
        self.reconnect_at = None;
        self.state.reset();
        self.last_endpoint = Some(endpoint.clone());

        info!(endpoint = %endpoint, "connecting");
        self.attempt(endpoint, now).await
    }

    /// Run the scheduled reconnect to the last endpoint
    pub async fn reconnect(&mut self, now: NaiveDateTime) -> Result<(), TransportError> {
        self.reconnect_at = None;
        let endpoint = self
            .last_endpoint
            .clone()
            .ok_or(TransportError::NotConnected)?;

        info!(
            endpoint = %endpoint,
            attempt = self.state.retry_count(),
            max = self.state.max_retries(),
            "reconnecting"
        );
        self.attempt(endpoint, now).await
    }

    async fn attempt(&mut self, endpoint: Endpoint, now: NaiveDateTime) -> Result<(), TransportError> {
        self.state.begin(endpoint.kind());

        let budget = self.config.connect_timeout();
        let opened = match timeout(budget, self.open(&endpoint)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(format!(
                "connecting to {} took longer than {:?}",
                endpoint, budget
            ))),
        };

        let transport = match opened {
            Ok(transport) => transport,
            Err(e) => {
                self.on_failure(&e).await;
                return Err(e);
            }
        };

        self.transport = Some(transport);
        self.state.mark_connected();
        info!(endpoint = %endpoint, via = %endpoint.kind(), "connected");

        self.sync_clock(now).await
    }

    async fn open(&mut self, endpoint: &Endpoint) -> Result<Box<dyn Transport>, TransportError> {
        match endpoint {
            Endpoint::Uart { port, baud_rate } => {
                let channel = self.connector.open_uart(port, *baud_rate).await?;
                self.state.set_phase(ConnectionPhase::Verifying);
                Ok(Box::new(UartTransport::new(channel, self.config.uart.clone())))
            }
            Endpoint::Ble { address } => {
                let link = self.connector.open_ble(address).await?;
                self.state.set_phase(ConnectionPhase::Verifying);
                let transport = BleTransport::open(
                    link,
                    self.config.profile.clone(),
                    self.config.flow.clone(),
                )
                .await?;
                Ok(Box::new(transport))
            }
        }
    }

    async fn sync_clock(&mut self, now: NaiveDateTime) -> Result<(), TransportError> {
        let command = Command::set_time_at(&now);
        let frame = match command.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "device clock not set");
                return Ok(());
            }
        };
        match self.send(&frame).await {
            Ok(_) => {
                debug!(time = %now, "device clock set");
                Ok(())
            }
            Err(e) if e.is_link_failure() => Err(e),
            Err(e) => {
                warn!(error = %e, "device clock not acknowledged");
                Ok(())
            }
        }
    }

    /// Classify a failure and update the lifecycle accordingly
    pub async fn on_failure(&mut self, error: &TransportError) -> RetryDecision {
        self.close_transport().await;

        if error.is_fatal() {
            error!(error = %error, "connection failed permanently");
            self.reconnect_at = None;
            self.state.reset();
            return RetryDecision::Fatal;
        }

        if !error.is_retryable() {
            error!(error = %error, "connection failed, reconnect would not help");
            self.reconnect_at = None;
            self.state.reset();
            return RetryDecision::GiveUp;
        }

        if self.state.can_retry() && self.last_endpoint.is_some() {
            let attempt = self.state.schedule_retry();
            let delay = self.config.reconnect_delay();
            self.reconnect_at = Some(Instant::now() + delay);
            warn!(
                error = %error,
                attempt,
                max = self.state.max_retries(),
                "connection lost, reconnect scheduled"
            );
            return RetryDecision::Retry { attempt, delay };
        }

        error!(error = %error, "connection failed, retries exhausted");
        self.reconnect_at = None;
        self.state.reset();
        RetryDecision::GiveUp
    }

    /// Drop the link. Always ends Disconnected and cancels any pending
    /// reconnect; calling it again is a no-op.
    pub async fn disconnect(&mut self) {
        let was_active = self.state.phase().is_active() || self.transport.is_some();
        self.close_transport().await;
        self.reconnect_at = None;
        self.state.reset();
        if was_active {
            info!("disconnected");
        }
    }

    async fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!(error = %e, "error while closing transport");
            }
        }
    }

    /// Send one frame over the live transport. A broken link is handed to
    /// the failure classifier before the error is returned.
    pub async fn send(&mut self, frame: &[u8]) -> Result<Reply, TransportError> {
        let result = self.transport_mut()?.send_frame(frame).await;
        if let Err(e) = &result {
            if e.is_link_failure() {
                self.on_failure(e).await;
            }
        }
        result
    }

    /// Unsolicited output waiting on the link; empty when disconnected
    pub async fn drain_output(&mut self) -> Result<Vec<u8>, TransportError> {
        let Some(transport) = self.transport.as_mut() else {
            return Ok(Vec::new());
        };
        let result = transport.drain_output().await;
        if let Err(e) = &result {
            if e.is_link_failure() {
                self.on_failure(e).await;
            }
        }
        result
    }

    /// The live transport, for multi-step exchanges such as log downloads
    pub fn transport_mut(&mut self) -> Result<&mut (dyn Transport + 'static), TransportError> {
        if !self.state.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.transport.as_deref_mut().ok_or(TransportError::NotConnected)
    }
}
