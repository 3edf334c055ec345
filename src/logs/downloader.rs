// Log Downloader - Chunked retrieval of the device log
//
// Wire format of the answer to RequestLog: [size_hi][size_lo][payload]

use crate::logs::transfer::{LogError, LogTransfer};
use crate::protocol::{Command, ProtocolCodec};
use crate::transport::{Transport, TransportError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

const SIZE_PREFIX_LEN: usize = 2;

/// Configuration for log downloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDownloaderConfig {
    /// Largest read requested per chunk
    pub chunk_size: usize,
}

impl Default for LogDownloaderConfig {
    fn default() -> Self {
        Self { chunk_size: 256 }
    }
}

impl LogDownloaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }
}

/// Pulls the device log over any transport
#[derive(Debug, Clone, Default)]
pub struct LogDownloader {
    config: LogDownloaderConfig,
}

impl LogDownloader {
    pub fn new(config: LogDownloaderConfig) -> Self {
        Self { config }
    }

    /// Request the log and read it to the announced size. An empty or
    /// failed chunk ends the transfer with IncompleteTransfer, which keeps
    /// every byte that arrived.
    pub async fn download(&self, transport: &mut dyn Transport) -> Result<LogTransfer, LogError> {
        self.fetch(transport, None).await
    }

    /// Same as `download`, but stops at `deadline`. Payload received by then
    /// is returned as IncompleteTransfer.
    pub async fn download_until(
        &self,
        transport: &mut dyn Transport,
        deadline: Instant,
    ) -> Result<LogTransfer, LogError> {
        self.fetch(transport, Some(deadline)).await
    }

    async fn fetch(
        &self,
        transport: &mut dyn Transport,
        deadline: Option<Instant>,
    ) -> Result<LogTransfer, LogError> {
        let frame = ProtocolCodec::encode(&Command::RequestLog)?;
        before(deadline, transport.begin_stream(&frame))
            .await
            .ok_or_else(|| TransportError::Timeout("log request".to_string()))??;

        let mut header = Vec::with_capacity(SIZE_PREFIX_LEN);
        while header.len() < SIZE_PREFIX_LEN {
            let chunk = before(deadline, transport.read_chunk(SIZE_PREFIX_LEN - header.len()))
                .await
                .ok_or_else(|| TransportError::Timeout("log size prefix".to_string()))??;
            if chunk.is_empty() {
                warn!(received = header.len(), "log size prefix missing");
                return Err(LogError::ShortRead { received: header.len() });
            }
            header.extend_from_slice(&chunk);
        }

        let size = ProtocolCodec::decode_log_size(header[0], header[1]);
        info!(size, "log download started");

        let mut transfer = LogTransfer::new(size);
        // BLE delivers whole characteristic values; payload may ride along
        transfer.push(&header[SIZE_PREFIX_LEN..]);

        let chunk_size = self.config.chunk_size.max(1);
        while !transfer.is_complete() {
            let want = chunk_size.min(transfer.remaining());
            match before(deadline, transport.read_chunk(want)).await {
                None => {
                    warn!(
                        received = transfer.received().len(),
                        expected = size,
                        "log transfer out of time"
                    );
                    return Err(transfer.into_incomplete());
                }
                Some(Ok(chunk)) if chunk.is_empty() => {
                    warn!(
                        received = transfer.received().len(),
                        expected = size,
                        "log transfer stalled"
                    );
                    return Err(transfer.into_incomplete());
                }
                Some(Ok(chunk)) => {
                    transfer.push(&chunk);
                    debug!(
                        received = transfer.received().len(),
                        expected = size,
                        "log chunk"
                    );
                }
                Some(Err(e)) => {
                    warn!(
                        error = %e,
                        received = transfer.received().len(),
                        expected = size,
                        "log read failed"
                    );
                    return Err(transfer.into_incomplete());
                }
            }
        }

        info!(size, "log download complete");
        Ok(transfer)
    }
}

/// Run `op` to completion, or until `deadline` when one is set
async fn before<T>(deadline: Option<Instant>, op: impl Future<Output = T>) -> Option<T> {
    match deadline {
        Some(at) => timeout_at(at, op).await.ok(),
        None => Some(op.await),
    }
}
