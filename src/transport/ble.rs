// BLE Transport Implementation
// Drives the device over a GATT link: one write characteristic (RX), one read
// characteristic (TX) and the flow-control register

use crate::transport::flow::{FlowConfig, FlowController, PollOutcome};
use crate::transport::{
    BleLink, Reply, Transport, TransportError, TransportKind, TransportStats,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ============================================================================
// BLE SERVICE AND CHARACTERISTIC
// ============================================================================

/// BLE GATT Service as discovered on a peripheral
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleService {
    uuid: Uuid,
    characteristics: Vec<BleCharacteristic>,
}

impl BleService {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn characteristics(&self) -> &[BleCharacteristic] {
        &self.characteristics
    }

    pub fn with_characteristic(mut self, characteristic: BleCharacteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    pub fn characteristic(&self, uuid: Uuid) -> Option<&BleCharacteristic> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// BLE GATT Characteristic definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleCharacteristic {
    uuid: Uuid,
    read: bool,
    write: bool,
}

impl BleCharacteristic {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            read: false,
            write: false,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn with_read(mut self) -> Self {
        self.read = true;
        self
    }

    pub fn with_write(mut self) -> Self {
        self.write = true;
        self
    }

    pub fn can_read(&self) -> bool {
        self.read
    }

    pub fn can_write(&self) -> bool {
        self.write
    }
}

// ============================================================================
// BLE PROFILE
// ============================================================================

/// GATT identifiers of the device's serial-over-BLE service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleProfile {
    /// Service carrying the three characteristics
    pub service_uuid: Uuid,
    /// Device to host data (host reads)
    pub tx_uuid: Uuid,
    /// Host to device data (host writes)
    pub rx_uuid: Uuid,
    /// Flow-control register (read/write)
    pub flow_uuid: Uuid,
}

impl Default for BleProfile {
    fn default() -> Self {
        Self {
            service_uuid: Uuid::from_u128(0xd2de8bd0_2b7a_11f0_90a7_0800200c9a66),
            tx_uuid: Uuid::from_u128(0xd2de8bd1_2b7a_11f0_90a7_0800200c9a66),
            rx_uuid: Uuid::from_u128(0xd2de8bd2_2b7a_11f0_90a7_0800200c9a66),
            flow_uuid: Uuid::from_u128(0xd2de8bd3_2b7a_11f0_90a7_0800200c9a66),
        }
    }
}

impl BleProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// The service as a compatible device exposes it
    pub fn service(&self) -> BleService {
        BleService::new(self.service_uuid)
            .with_characteristic(BleCharacteristic::new(self.tx_uuid).with_read())
            .with_characteristic(BleCharacteristic::new(self.rx_uuid).with_write())
            .with_characteristic(BleCharacteristic::new(self.flow_uuid).with_read().with_write())
    }

    /// Check a peripheral's services against this profile. TX must be
    /// readable, RX writable and the register both; extra characteristics
    /// are fine. Any shortfall is an IncompatibleDevice error.
    pub fn verify(&self, services: &[BleService]) -> Result<(), TransportError> {
        let service = services
            .iter()
            .find(|s| s.uuid() == self.service_uuid)
            .ok_or_else(|| {
                TransportError::IncompatibleDevice(format!(
                    "required service {} not found",
                    self.service_uuid
                ))
            })?;

        // (name, uuid, needs read, needs write)
        let missing: Vec<String> = [
            ("TX", self.tx_uuid, true, false),
            ("RX", self.rx_uuid, false, true),
            ("flow-control", self.flow_uuid, true, true),
        ]
        .iter()
        .filter(|(_, uuid, read, write)| match service.characteristic(*uuid) {
            Some(c) => (*read && !c.can_read()) || (*write && !c.can_write()),
            None => true,
        })
        .map(|(name, uuid, _, _)| format!("{} {}", name, uuid))
        .collect();

        if !missing.is_empty() {
            return Err(TransportError::IncompatibleDevice(format!(
                "missing characteristics: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

// ============================================================================
// BLE TRANSPORT
// ============================================================================

/// BLE transport over a verified link
pub struct BleTransport {
    link: Box<dyn BleLink>,
    profile: BleProfile,
    flow: FlowController,
    stats: TransportStats,
    closed: bool,
}

impl BleTransport {
    /// Verify the link against the profile and wrap it. On failure the link
    /// is disconnected before the error is returned.
    pub async fn open(
        mut link: Box<dyn BleLink>,
        profile: BleProfile,
        flow: FlowConfig,
    ) -> Result<Self, TransportError> {
        if let Err(e) = profile.verify(&link.services()) {
            warn!(error = %e, "BLE verification failed");
            if let Err(close_err) = link.disconnect().await {
                debug!(error = %close_err, "disconnect after failed verification");
            }
            return Err(e);
        }
        info!("BLE services verified");

        Ok(Self {
            link,
            flow: FlowController::new(flow, profile.clone()),
            profile,
            stats: TransportStats::default(),
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for BleTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    async fn send_frame(&mut self, frame: &[u8]) -> Result<Reply, TransportError> {
        self.ensure_open()?;
        debug!(frame = %hex::encode(frame), "BLE exchange");

        let outcome = self.flow.exchange(self.link.as_mut(), frame).await?;
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        self.stats.bytes_received += outcome.data().len() as u64;

        match outcome {
            PollOutcome::Complete(data) => Ok(Reply { data, complete: true }),
            PollOutcome::Empty => Ok(Reply::none()),
            PollOutcome::TimedOut(data) if !data.is_empty() => {
                Ok(Reply { data, complete: false })
            }
            PollOutcome::TimedOut(_) => Err(TransportError::Timeout(format!(
                "no reply after {} polls",
                self.flow.config().max_polls
            ))),
        }
    }

    async fn begin_stream(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        debug!(frame = %hex::encode(frame), "BLE stream request");

        self.flow.write_paced(self.link.as_mut(), frame).await?;
        self.flow.request(self.link.as_mut()).await?;
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        Ok(())
    }

    async fn read_chunk(&mut self, _max: usize) -> Result<Vec<u8>, TransportError> {
        self.ensure_open()?;

        let chunk = self.link.read(self.profile.tx_uuid).await.map_err(|e| {
            self.stats.read_errors += 1;
            TransportError::ReceiveFailed(format!("TX read: {}", e))
        })?;

        if !chunk.is_empty() {
            self.stats.bytes_received += chunk.len() as u64;
            self.flow.acknowledge(self.link.as_mut()).await?;
        }
        Ok(chunk)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.link.disconnect().await
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
