// Transport Traits and Core Types
// Defines the leaf I/O seams (byte channel, BLE link), the unified Transport
// trait driven by the protocol layer, and the types shared by both media

use crate::transport::ble::BleService;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// TRANSPORT KIND
// ============================================================================

/// Physical medium used to reach the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    Uart,
    Ble,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uart => write!(f, "UART"),
            Self::Ble => write!(f, "Bluetooth"),
        }
    }
}

// ============================================================================
// ENDPOINT
// ============================================================================

/// Where a device can be reached
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Endpoint {
    /// Serial port path ("/dev/ttyUSB0", "COM3") and line speed
    Uart { port: String, baud_rate: u32 },
    /// BLE device address or advertised name
    Ble { address: String },
}

impl Endpoint {
    /// Default line speed of the device firmware
    pub const DEFAULT_BAUD_RATE: u32 = 9600;

    /// Create a UART endpoint
    pub fn uart(port: &str, baud_rate: u32) -> Self {
        Self::Uart {
            port: port.to_string(),
            baud_rate,
        }
    }

    /// Create a BLE endpoint
    pub fn ble(address: &str) -> Self {
        Self::Ble {
            address: address.to_string(),
        }
    }

    /// Transport needed to reach this endpoint
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Uart { .. } => TransportKind::Uart,
            Self::Ble { .. } => TransportKind::Ble,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uart { port, baud_rate } => write!(f, "uart://{}@{}", port, baud_rate),
            Self::Ble { address } => write!(f, "ble://{}", address),
        }
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Uart { port: p1, baud_rate: b1 },
                Self::Uart { port: p2, baud_rate: b2 },
            ) => p1 == p2 && b1 == b2,
            (Self::Ble { address: a1 }, Self::Ble { address: a2 }) => {
                a1.to_uppercase() == a2.to_uppercase()
            }
            _ => false,
        }
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Uart { port, baud_rate } => {
                0u8.hash(state);
                port.hash(state);
                baud_rate.hash(state);
            }
            Self::Ble { address } => {
                1u8.hash(state);
                address.to_uppercase().hash(state);
            }
        }
    }
}

/// An endpoint reported by platform discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub endpoint: Endpoint,
    pub name: Option<String>,
}

// ============================================================================
// TRANSPORT ERRORS
// ============================================================================

/// Errors that can occur in the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Incompatible device: {0}")]
    IncompatibleDevice(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Link closed")]
    Closed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl TransportError {
    /// The device or host can never complete this connection
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IncompatibleDevice(_) | Self::HardwareUnavailable(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// The open handle is no longer usable. A timeout leaves the link intact.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Self::Closed | Self::SendFailed(_) | Self::ReceiveFailed(_) | Self::IoError(_)
        )
    }

    /// Check if a reconnect may cure this failure
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed(_)
                | Self::Timeout(_)
                | Self::Closed
                | Self::SendFailed(_)
                | Self::ReceiveFailed(_)
                | Self::IoError(_)
        )
    }
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => Self::Timeout(e.to_string()),
            _ => Self::IoError(e.to_string()),
        }
    }
}

// ============================================================================
// REPLY
// ============================================================================

/// What the device answered to a frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// Reply bytes in arrival order
    pub data: Vec<u8>,
    /// False when the medium gave up before the device signalled completion
    pub complete: bool,
}

impl Reply {
    /// A reply for media that do not wait for an answer
    pub fn none() -> Self {
        Self {
            data: Vec::new(),
            complete: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Reply decoded as text; invalid UTF-8 is replaced, never rejected
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).trim().to_string()
    }
}

// ============================================================================
// TRANSPORT STATISTICS
// ============================================================================

/// Counters kept by every transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportStats {
    /// Frames handed to the medium
    pub frames_sent: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Read attempts that failed or returned garbage
    pub read_errors: u64,
}

// ============================================================================
// LEAF I/O TRAITS
// ============================================================================

/// Raw duplex byte stream (serial port)
#[async_trait]
pub trait ByteChannel: Send {
    /// Write every byte or fail
    async fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Read whatever is available, waiting at most `timeout`.
    /// Returns Ok(0) when nothing arrived in time.
    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Release the port. Closing twice is not an error.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Connected BLE peripheral with discovered GATT services
#[async_trait]
pub trait BleLink: Send {
    /// GATT services found during discovery
    fn services(&self) -> Vec<BleService>;

    /// Write a characteristic value
    async fn write(&mut self, characteristic: Uuid, data: &[u8]) -> Result<(), TransportError>;

    /// Read a characteristic value
    async fn read(&mut self, characteristic: Uuid) -> Result<Vec<u8>, TransportError>;

    /// Drop the connection. Disconnecting twice is not an error.
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

// ============================================================================
// TRANSPORT TRAIT
// ============================================================================

/// Unified send/receive surface the protocol layer drives, whatever the medium
#[async_trait]
pub trait Transport: Send {
    /// Medium behind this transport
    fn kind(&self) -> TransportKind;

    /// Deliver one frame with a single write and collect the device reply
    /// when the medium has a reply phase
    async fn send_frame(&mut self, frame: &[u8]) -> Result<Reply, TransportError>;

    /// Deliver a frame that makes the device start streaming data back
    async fn begin_stream(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Next chunk of an active stream, at most `max` bytes where the medium
    /// allows it. An empty chunk means nothing arrived in time.
    async fn read_chunk(&mut self, max: usize) -> Result<Vec<u8>, TransportError>;

    /// Unsolicited device output waiting on the link
    async fn drain_output(&mut self) -> Result<Vec<u8>, TransportError> {
        Ok(Vec::new())
    }

    /// Release the underlying handle. Closing twice is not an error.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Get transport statistics
    fn stats(&self) -> TransportStats;
}

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

/// Opens leaf handles for endpoints
#[async_trait]
pub trait Connector: Send {
    /// Open a serial port
    async fn open_uart(&mut self, port: &str, baud_rate: u32)
        -> Result<Box<dyn ByteChannel>, TransportError>;

    /// Connect to a BLE peripheral and discover its services
    async fn open_ble(&mut self, address: &str) -> Result<Box<dyn BleLink>, TransportError>;
}

/// Platform enumeration of candidate endpoints
#[async_trait]
pub trait Discovery: Send + Sync {
    async fn discover(&self, kind: TransportKind) -> Result<Vec<DiscoveredDevice>, TransportError>;
}
