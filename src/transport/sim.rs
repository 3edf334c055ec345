// Simulated Device Links
// In-memory stand-ins for a serial port, a BLE peripheral and the connector
// that opens them. Every handle is a cheap clone sharing one state, so a test
// keeps a clone to script the device and inspect what the host wrote.

use crate::transport::ble::{BleProfile, BleService};
use crate::transport::{BleLink, ByteChannel, Connector, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::{sleep, Duration};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// SIMULATED SERIAL CHANNEL
// ============================================================================

#[derive(Debug, Default)]
struct ChannelState {
    writes: Vec<Vec<u8>>,
    inbound: VecDeque<u8>,
    fail_writes: bool,
    read_delay: Option<Duration>,
    close_calls: usize,
    closed: bool,
}

/// Serial port backed by in-memory buffers
#[derive(Debug, Clone, Default)]
pub struct SimulatedChannel {
    state: Arc<Mutex<ChannelState>>,
}

impl SimulatedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes for the host to read
    pub fn push_inbound(&self, data: &[u8]) {
        lock(&self.state).inbound.extend(data.iter().copied());
    }

    /// Every write_all call, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.state).writes.clone()
    }

    /// All bytes written, concatenated
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).writes.concat()
    }

    pub fn fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    /// Delay every read by `delay`, like a slow line
    pub fn set_read_delay(&self, delay: Duration) {
        lock(&self.state).read_delay = Some(delay);
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn close_calls(&self) -> usize {
        lock(&self.state).close_calls
    }
}

#[async_trait]
impl ByteChannel for SimulatedChannel {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.fail_writes {
            return Err(TransportError::SendFailed("simulated write failure".to_string()));
        }
        state.writes.push(data.to_vec());
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, TransportError> {
        let delay = lock(&self.state).read_delay;
        if let Some(delay) = delay {
            sleep(delay).await;
        }

        let mut state = lock(&self.state);
        if state.closed {
            return Err(TransportError::Closed);
        }
        let count = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        state.close_calls += 1;
        state.closed = true;
        Ok(())
    }
}

// ============================================================================
// SIMULATED BLE PERIPHERAL
// ============================================================================

#[derive(Debug, Default)]
struct PeripheralState {
    services: Vec<BleService>,
    writes: Vec<(Uuid, Vec<u8>)>,
    tx_chunks: VecDeque<Vec<u8>>,
    fail_tx_reads: bool,
    fail_writes: bool,
    register_script: VecDeque<u8>,
    register: u8,
    complete_when_drained: bool,
    disconnect_calls: usize,
    disconnected: bool,
}

/// BLE peripheral exposing scripted characteristics
#[derive(Debug, Clone)]
pub struct SimulatedBleLink {
    profile: BleProfile,
    state: Arc<Mutex<PeripheralState>>,
}

impl SimulatedBleLink {
    /// Peripheral exposing the given services
    pub fn with_services(profile: BleProfile, services: Vec<BleService>) -> Self {
        Self {
            profile,
            state: Arc::new(Mutex::new(PeripheralState {
                services,
                ..PeripheralState::default()
            })),
        }
    }

    /// Peripheral exposing the full device service. Its register reads
    /// Complete as soon as every queued TX chunk has been read.
    pub fn compatible(profile: BleProfile) -> Self {
        let service = profile.service();
        let link = Self::with_services(profile, vec![service]);
        lock(&link.state).complete_when_drained = true;
        link
    }

    /// Queue one TX characteristic value
    pub fn push_tx(&self, chunk: &[u8]) {
        lock(&self.state).tx_chunks.push_back(chunk.to_vec());
    }

    /// Register values returned by the next reads, before the default rule
    pub fn script_register(&self, values: &[u8]) {
        lock(&self.state).register_script.extend(values.iter().copied());
    }

    /// Fixed register value once the script is exhausted
    pub fn set_register(&self, value: u8) {
        let mut state = lock(&self.state);
        state.register = value;
        state.complete_when_drained = false;
    }

    pub fn fail_tx_reads(&self, fail: bool) {
        lock(&self.state).fail_tx_reads = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    /// Every characteristic write, in order
    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        lock(&self.state).writes.clone()
    }

    /// Values written to one characteristic
    pub fn writes_to(&self, characteristic: Uuid) -> Vec<Vec<u8>> {
        lock(&self.state)
            .writes
            .iter()
            .filter(|(uuid, _)| *uuid == characteristic)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Bytes received on RX, concatenated
    pub fn rx_bytes(&self) -> Vec<u8> {
        self.writes_to(self.profile.rx_uuid).concat()
    }

    pub fn is_disconnected(&self) -> bool {
        lock(&self.state).disconnected
    }

    pub fn disconnect_calls(&self) -> usize {
        lock(&self.state).disconnect_calls
    }
}

#[async_trait]
impl BleLink for SimulatedBleLink {
    fn services(&self) -> Vec<BleService> {
        lock(&self.state).services.clone()
    }

    async fn write(&mut self, characteristic: Uuid, data: &[u8]) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if state.disconnected {
            return Err(TransportError::Closed);
        }
        if state.fail_writes {
            return Err(TransportError::SendFailed("simulated write failure".to_string()));
        }
        state.writes.push((characteristic, data.to_vec()));
        Ok(())
    }

    async fn read(&mut self, characteristic: Uuid) -> Result<Vec<u8>, TransportError> {
        let mut state = lock(&self.state);
        if state.disconnected {
            return Err(TransportError::Closed);
        }

        if characteristic == self.profile.tx_uuid {
            if state.fail_tx_reads {
                return Err(TransportError::ReceiveFailed("simulated TX read failure".to_string()));
            }
            return Ok(state.tx_chunks.pop_front().unwrap_or_default());
        }

        if characteristic == self.profile.flow_uuid {
            let value = match state.register_script.pop_front() {
                Some(value) => value,
                None if state.complete_when_drained => {
                    if state.tx_chunks.is_empty() {
                        2
                    } else {
                        1
                    }
                }
                None => state.register,
            };
            return Ok(vec![value]);
        }

        Err(TransportError::ReceiveFailed(format!(
            "characteristic {} not readable",
            characteristic
        )))
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        state.disconnect_calls += 1;
        state.disconnected = true;
        Ok(())
    }
}

// ============================================================================
// SIMULATED CONNECTOR
// ============================================================================

#[derive(Debug, Default)]
struct ConnectorState {
    uart: VecDeque<Result<SimulatedChannel, TransportError>>,
    ble: VecDeque<Result<SimulatedBleLink, TransportError>>,
    attempts: Vec<String>,
    open_delay: Option<Duration>,
}

/// Connector handing out scripted simulated links.
/// An attempt with nothing scripted fails with ConnectFailed.
#[derive(Debug, Clone, Default)]
pub struct SimConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl SimConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcome of the next UART open
    pub fn push_uart(&self, outcome: Result<SimulatedChannel, TransportError>) {
        lock(&self.state).uart.push_back(outcome);
    }

    /// Outcome of the next BLE open
    pub fn push_ble(&self, outcome: Result<SimulatedBleLink, TransportError>) {
        lock(&self.state).ble.push_back(outcome);
    }

    /// Delay every open by `delay`
    pub fn set_open_delay(&self, delay: Duration) {
        lock(&self.state).open_delay = Some(delay);
    }

    /// Number of open attempts so far
    pub fn attempts(&self) -> usize {
        lock(&self.state).attempts.len()
    }

    /// Targets of the open attempts, in order
    pub fn attempted(&self) -> Vec<String> {
        lock(&self.state).attempts.clone()
    }

    async fn delay(&self) {
        let delay = lock(&self.state).open_delay;
        if let Some(delay) = delay {
            sleep(delay).await;
        }
    }
}

#[async_trait]
impl Connector for SimConnector {
    async fn open_uart(
        &mut self,
        port: &str,
        _baud_rate: u32,
    ) -> Result<Box<dyn ByteChannel>, TransportError> {
        lock(&self.state).attempts.push(port.to_string());
        self.delay().await;

        let outcome = lock(&self.state).uart.pop_front();
        match outcome {
            Some(Ok(channel)) => Ok(Box::new(channel)),
            Some(Err(e)) => Err(e),
            None => Err(TransportError::ConnectFailed(format!("no device on {}", port))),
        }
    }

    async fn open_ble(&mut self, address: &str) -> Result<Box<dyn BleLink>, TransportError> {
        lock(&self.state).attempts.push(address.to_string());
        self.delay().await;

        let outcome = lock(&self.state).ble.pop_front();
        match outcome {
            Some(Ok(link)) => Ok(Box::new(link)),
            Some(Err(e)) => Err(e),
            None => Err(TransportError::ConnectFailed(format!("no device at {}", address))),
        }
    }
}
