// Hardware Connector - Opens real serial ports and BLE peripherals
// Backends are compiled in with the `serial` and `ble` features; without
// them every open fails with HardwareUnavailable.

use crate::transport::{
    BleLink, ByteChannel, Connector, DiscoveredDevice, Discovery, TransportError, TransportKind,
};
use async_trait::async_trait;
use tokio::time::Duration;

/// Connector for the platform serial and Bluetooth stacks
#[derive(Debug, Clone)]
pub struct HardwareConnector {
    scan_window: Duration,
}

impl Default for HardwareConnector {
    fn default() -> Self {
        Self {
            scan_window: Duration::from_secs(10),
        }
    }
}

impl HardwareConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// How long a BLE connect scans for the target
    pub fn with_scan_window(mut self, window: Duration) -> Self {
        self.scan_window = window;
        self
    }

    pub fn scan_window(&self) -> Duration {
        self.scan_window
    }
}

#[async_trait]
impl Connector for HardwareConnector {
    #[cfg(feature = "serial")]
    async fn open_uart(
        &mut self,
        port: &str,
        baud_rate: u32,
    ) -> Result<Box<dyn ByteChannel>, TransportError> {
        let channel = crate::transport::serial::SerialChannel::open(port, baud_rate)?;
        Ok(Box::new(channel))
    }

    #[cfg(not(feature = "serial"))]
    async fn open_uart(
        &mut self,
        port: &str,
        _baud_rate: u32,
    ) -> Result<Box<dyn ByteChannel>, TransportError> {
        Err(TransportError::HardwareUnavailable(format!(
            "cannot open {}: built without the `serial` feature",
            port
        )))
    }

    #[cfg(feature = "ble")]
    async fn open_ble(&mut self, address: &str) -> Result<Box<dyn BleLink>, TransportError> {
        let link = crate::transport::btle::BtleLink::connect(address, self.scan_window()).await?;
        Ok(Box::new(link))
    }

    #[cfg(not(feature = "ble"))]
    async fn open_ble(&mut self, address: &str) -> Result<Box<dyn BleLink>, TransportError> {
        Err(TransportError::HardwareUnavailable(format!(
            "cannot reach {}: built without the `ble` feature",
            address
        )))
    }
}

/// Enumerates serial ports and nearby BLE peripherals
#[derive(Debug, Clone)]
pub struct HardwareDiscovery {
    scan_window: Duration,
}

impl Default for HardwareDiscovery {
    fn default() -> Self {
        Self {
            scan_window: Duration::from_secs(5),
        }
    }
}

impl HardwareDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan_window(mut self, window: Duration) -> Self {
        self.scan_window = window;
        self
    }

    pub fn scan_window(&self) -> Duration {
        self.scan_window
    }
}

#[async_trait]
impl Discovery for HardwareDiscovery {
    async fn discover(&self, kind: TransportKind) -> Result<Vec<DiscoveredDevice>, TransportError> {
        match kind {
            #[cfg(feature = "serial")]
            TransportKind::Uart => crate::transport::serial::list_ports(),
            #[cfg(feature = "ble")]
            TransportKind::Ble => crate::transport::btle::scan(self.scan_window()).await,
            #[allow(unreachable_patterns)]
            other => Err(TransportError::HardwareUnavailable(format!(
                "{} discovery not compiled in",
                other
            ))),
        }
    }
}
