// BLE Backend - BleLink over the platform Bluetooth stack

use crate::transport::ble::{BleCharacteristic, BleService};
use crate::transport::{BleLink, DiscoveredDevice, Endpoint, TransportError};
use async_trait::async_trait;
use btleplug::api::{
    Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use std::collections::HashMap;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

fn backend_error(e: btleplug::Error) -> TransportError {
    TransportError::ConnectFailed(e.to_string())
}

async fn first_adapter() -> Result<Adapter, TransportError> {
    let manager = Manager::new().await.map_err(backend_error)?;
    manager
        .adapters()
        .await
        .map_err(backend_error)?
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::HardwareUnavailable("no Bluetooth adapter".to_string()))
}

/// Scan for `window` and report every peripheral seen
pub async fn scan(window: Duration) -> Result<Vec<DiscoveredDevice>, TransportError> {
    let adapter = first_adapter().await?;
    adapter.start_scan(ScanFilter::default()).await.map_err(backend_error)?;
    sleep(window).await;

    let mut found = Vec::new();
    for peripheral in adapter.peripherals().await.map_err(backend_error)? {
        if let Ok(Some(props)) = peripheral.properties().await {
            found.push(DiscoveredDevice {
                endpoint: Endpoint::ble(&props.address.to_string()),
                name: props.local_name,
            });
        }
    }

    if let Err(e) = adapter.stop_scan().await {
        debug!(error = %e, "failed to stop scan");
    }
    Ok(found)
}

/// A connected peripheral with its discovered characteristics
pub struct BtleLink {
    peripheral: Peripheral,
    services: Vec<BleService>,
    characteristics: HashMap<Uuid, Characteristic>,
    connected: bool,
}

impl BtleLink {
    /// Scan until a peripheral whose address or advertised name matches
    /// `target` shows up, then connect and discover its services
    pub async fn connect(target: &str, scan_window: Duration) -> Result<Self, TransportError> {
        let adapter = first_adapter().await?;
        adapter.start_scan(ScanFilter::default()).await.map_err(backend_error)?;

        let deadline = Instant::now() + scan_window;
        let peripheral = loop {
            if let Some(found) = find(&adapter, target).await? {
                break found;
            }
            if Instant::now() >= deadline {
                return Err(TransportError::ConnectFailed(format!(
                    "device {} not found",
                    target
                )));
            }
            sleep(Duration::from_millis(250)).await;
        };

        if let Err(e) = adapter.stop_scan().await {
            debug!(error = %e, "failed to stop scan");
        }

        peripheral.connect().await.map_err(backend_error)?;
        peripheral.discover_services().await.map_err(backend_error)?;
        info!(target, "BLE peripheral connected");

        let mut services = Vec::new();
        let mut characteristics = HashMap::new();
        for service in peripheral.services() {
            let mut discovered = BleService::new(service.uuid);
            for c in service.characteristics {
                let mut entry = BleCharacteristic::new(c.uuid);
                if c.properties.contains(CharPropFlags::READ) {
                    entry = entry.with_read();
                }
                if c.properties.intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE) {
                    entry = entry.with_write();
                }
                discovered = discovered.with_characteristic(entry);
                characteristics.insert(c.uuid, c);
            }
            services.push(discovered);
        }

        Ok(Self {
            peripheral,
            services,
            characteristics,
            connected: true,
        })
    }

    fn characteristic(&self, uuid: Uuid) -> Result<&Characteristic, TransportError> {
        self.characteristics
            .get(&uuid)
            .ok_or_else(|| TransportError::IncompatibleDevice(format!("characteristic {} missing", uuid)))
    }
}

async fn find(adapter: &Adapter, target: &str) -> Result<Option<Peripheral>, TransportError> {
    for peripheral in adapter.peripherals().await.map_err(backend_error)? {
        let Ok(Some(props)) = peripheral.properties().await else {
            continue;
        };
        let address_match = props.address.to_string().eq_ignore_ascii_case(target);
        let name_match = props.local_name.as_deref() == Some(target);
        if address_match || name_match {
            return Ok(Some(peripheral));
        }
    }
    Ok(None)
}

#[async_trait]
impl BleLink for BtleLink {
    fn services(&self) -> Vec<BleService> {
        self.services.clone()
    }

    async fn write(&mut self, characteristic: Uuid, data: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::Closed);
        }
        let c = self.characteristic(characteristic)?.clone();
        self.peripheral
            .write(&c, data, WriteType::WithResponse)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn read(&mut self, characteristic: Uuid) -> Result<Vec<u8>, TransportError> {
        if !self.connected {
            return Err(TransportError::Closed);
        }
        let c = self.characteristic(characteristic)?.clone();
        self.peripheral
            .read(&c)
            .await
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| TransportError::IoError(e.to_string()))
    }
}
