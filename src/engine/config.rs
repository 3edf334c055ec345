// Engine Configuration

use crate::connection::ConnectionConfig;
use crate::engine::EngineError;
use crate::logs::LogDownloaderConfig;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

/// Configuration for the engine worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Round-trip budget of a single command, in milliseconds
    pub command_timeout_ms: u64,
    /// Interval of the UART console monitor, in milliseconds
    pub monitor_interval_ms: u64,
    /// Capacity of the request queue
    pub request_queue: usize,
    /// Capacity of the event stream
    pub event_queue: usize,
    /// Connection lifecycle settings
    pub connection: ConnectionConfig,
    /// Log download settings
    pub downloader: LogDownloaderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 15_000,
            monitor_interval_ms: 200,
            request_queue: 32,
            event_queue: 256,
            connection: ConnectionConfig::default(),
            downloader: LogDownloaderConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_command_timeout_ms(mut self, ms: u64) -> Self {
        self.command_timeout_ms = ms;
        self
    }

    pub fn with_monitor_interval_ms(mut self, ms: u64) -> Self {
        self.monitor_interval_ms = ms;
        self
    }

    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_downloader(mut self, downloader: LogDownloaderConfig) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.command_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "command_timeout_ms cannot be 0".to_string(),
            ));
        }
        if self.monitor_interval_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "monitor_interval_ms cannot be 0".to_string(),
            ));
        }
        if self.request_queue == 0 || self.event_queue == 0 {
            return Err(EngineError::InvalidConfig(
                "queue capacities cannot be 0".to_string(),
            ));
        }
        self.connection.validate()?;
        Ok(())
    }
}
