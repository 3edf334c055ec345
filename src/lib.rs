// Ambiance - Control engine for Ambiance audio playback devices
// Command codec, UART and BLE transports, connection lifecycle,
// log download and the playback schedule queue

pub mod connection;
pub mod engine;
pub mod logs;
pub mod protocol;
pub mod schedule;
pub mod transport;

pub use connection::{ConnectionConfig, ConnectionManager, ConnectionPhase, ConnectionState};
pub use engine::{Engine, EngineConfig, EngineError, EngineEvent, EngineHandle};
pub use protocol::{Command, ProtocolCodec};
pub use schedule::{ScheduleEntry, ScheduleStore, TimeOfDay};
pub use transport::{Endpoint, Transport, TransportError, TransportKind};
