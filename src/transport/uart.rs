// UART Transport Implementation
// Frames go out as one write; the device answers on the same line as
// free-form console text, which is collected by draining the channel

use crate::transport::{ByteChannel, Reply, Transport, TransportError, TransportKind, TransportStats};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;
use tracing::{debug, trace};

// ============================================================================
// UART TRANSPORT CONFIG
// ============================================================================

/// Configuration for UART transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UartConfig {
    /// Per-read timeout while streaming, in milliseconds
    pub read_timeout_ms: u64,
    /// How long a console drain waits for bytes, in milliseconds
    pub drain_timeout_ms: u64,
    /// Largest console read in one drain
    pub drain_chunk: usize,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 1000,
            drain_timeout_ms: 20,
            drain_chunk: 256,
        }
    }
}

impl UartConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_timeout_ms(mut self, ms: u64) -> Self {
        self.read_timeout_ms = ms;
        self
    }

    pub fn with_drain_timeout_ms(mut self, ms: u64) -> Self {
        self.drain_timeout_ms = ms;
        self
    }

    pub fn with_drain_chunk(mut self, size: usize) -> Self {
        self.drain_chunk = size;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.read_timeout_ms == 0 {
            return Err(TransportError::InvalidConfig(
                "read_timeout_ms cannot be 0".to_string(),
            ));
        }
        if self.drain_chunk == 0 {
            return Err(TransportError::InvalidConfig(
                "drain_chunk cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// UART TRANSPORT
// ============================================================================

/// UART transport over an open serial channel
pub struct UartTransport {
    channel: Box<dyn ByteChannel>,
    config: UartConfig,
    stats: TransportStats,
    closed: bool,
}

impl UartTransport {
    pub fn new(channel: Box<dyn ByteChannel>, config: UartConfig) -> Self {
        Self {
            channel,
            config,
            stats: TransportStats::default(),
            closed: false,
        }
    }

    pub fn config(&self) -> &UartConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        debug!(frame = %hex::encode(frame), "UART write");
        self.channel.write_all(frame).await?;
        self.stats.frames_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        Ok(())
    }

    async fn read_with_timeout(
        &mut self,
        max: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.ensure_open()?;
        let mut buf = vec![0u8; max.max(1)];
        let read = match self.channel.read(&mut buf, timeout).await {
            Ok(n) => n,
            Err(e) => {
                self.stats.read_errors += 1;
                return Err(e);
            }
        };
        buf.truncate(read);
        self.stats.bytes_received += read as u64;
        Ok(buf)
    }
}

#[async_trait]
impl Transport for UartTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Uart
    }

    async fn send_frame(&mut self, frame: &[u8]) -> Result<Reply, TransportError> {
        self.write_frame(frame).await?;
        Ok(Reply::none())
    }

    async fn begin_stream(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.write_frame(frame).await
    }

    async fn read_chunk(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        let timeout = Duration::from_millis(self.config.read_timeout_ms);
        let chunk = self.read_with_timeout(max, timeout).await?;
        trace!(bytes = chunk.len(), "UART chunk");
        Ok(chunk)
    }

    async fn drain_output(&mut self) -> Result<Vec<u8>, TransportError> {
        let timeout = Duration::from_millis(self.config.drain_timeout_ms);
        self.read_with_timeout(self.config.drain_chunk, timeout).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.channel.close().await
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
