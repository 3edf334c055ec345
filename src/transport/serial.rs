// Serial Port Backend
// ByteChannel over a native serial port (8N1, no flow control)

use crate::transport::{ByteChannel, DiscoveredDevice, Endpoint, TransportError};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Duration};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info};

/// An open serial port
pub struct SerialChannel {
    port: String,
    stream: Option<SerialStream>,
}

impl SerialChannel {
    /// Open `port` at `baud_rate`
    pub fn open(port: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let stream = tokio_serial::new(port, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| TransportError::ConnectFailed(format!("{}: {}", port, e)))?;

        info!(port, baud_rate, "serial port opened");
        Ok(Self {
            port: port.to_string(),
            stream: Some(stream),
        })
    }

    fn stream(&mut self) -> Result<&mut SerialStream, TransportError> {
        self.stream.as_mut().ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl ByteChannel for SerialChannel {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream()?;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8], wait: Duration) -> Result<usize, TransportError> {
        let stream = self.stream()?;
        match timeout(wait, stream.read(buf)).await {
            Ok(Ok(0)) => Err(TransportError::Closed),
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Ok(0),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.stream.take().is_some() {
            debug!(port = %self.port, "serial port closed");
        }
        Ok(())
    }
}

/// Serial ports the OS currently reports
pub fn list_ports() -> Result<Vec<DiscoveredDevice>, TransportError> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| TransportError::HardwareUnavailable(e.to_string()))?;

    Ok(ports
        .into_iter()
        .map(|info| {
            let name = match info.port_type {
                tokio_serial::SerialPortType::UsbPort(usb) => usb.product,
                _ => None,
            };
            DiscoveredDevice {
                endpoint: Endpoint::uart(&info.port_name, Endpoint::DEFAULT_BAUD_RATE),
                name,
            }
        })
        .collect())
}
