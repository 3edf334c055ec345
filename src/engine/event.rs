// Engine Events and Errors

use crate::logs::LogError;
use crate::protocol::CodecError;
use crate::schedule::ScheduleError;
use crate::transport::{Endpoint, TransportError, TransportKind};
use std::path::PathBuf;
use thiserror::Error;
use tokio::time::Duration;

// ============================================================================
// ENGINE EVENTS
// ============================================================================

/// Asynchronous notifications from the engine worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A connect attempt started
    Connecting { endpoint: Endpoint },
    /// The link is up and verified
    Connected { endpoint: Endpoint, via: TransportKind },
    /// The link failed and a reconnect is scheduled
    Reconnecting { attempt: u32, max: u32, reason: String },
    /// The link is down; `reason` is None after an explicit disconnect
    Disconnected { reason: Option<String> },
    /// Text the device printed, unsolicited or as a reply
    DeviceOutput(String),
    /// A command reached the device
    CommandSent(String),
    /// Schedules accepted by the device and removed from the queue
    SchedulesSent { count: usize },
    /// Result of a schedule import
    SchedulesImported { imported: usize, skipped: usize },
    /// Start of a downloaded log, shown before saving
    LogPreview { text: String, complete: bool },
    /// A file was written by the persistence sink
    Saved(PathBuf),
    /// The persistence sink declined to save
    SaveCancelled,
}

// ============================================================================
// ENGINE ERRORS
// ============================================================================

/// Errors reported to engine callers
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No device connected")]
    NotConnected,

    #[error("No schedules queued")]
    EmptyQueue,

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Engine stopped")]
    Stopped,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Log(#[from] LogError),
}

impl EngineError {
    /// An engine or transport budget ran out
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }
}
