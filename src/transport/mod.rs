// Transport module - THE WIRE
// UART and BLE links to the device behind one Transport trait

mod traits;
mod ble;
mod flow;
mod uart;
mod hardware;
pub mod sim;

#[cfg(feature = "serial")]
mod serial;
#[cfg(feature = "ble")]
mod btle;

pub use traits::{
    // Core traits
    Transport, ByteChannel, BleLink,
    // Collaborators
    Connector, Discovery,
    // Address types
    Endpoint, DiscoveredDevice, TransportKind,
    // Results and errors
    Reply, TransportError,
    // Statistics
    TransportStats,
};

pub use ble::{BleCharacteristic, BleProfile, BleService, BleTransport};

pub use flow::{FlowConfig, FlowController, FlowState, PollOutcome};

pub use uart::{UartConfig, UartTransport};

pub use hardware::{HardwareConnector, HardwareDiscovery};
