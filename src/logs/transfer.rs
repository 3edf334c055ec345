// Log Transfer - Size-prefixed payload being collected from the device

use crate::protocol::CodecError;
use crate::transport::TransportError;
use chrono::NaiveDateTime;
use thiserror::Error;

/// Characters of a log shown before it is saved
pub const PREVIEW_CHARS: usize = 300;

/// Errors that can occur while downloading the device log
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    #[error("Short read: expected 2 size bytes, got {received}")]
    ShortRead { received: usize },

    #[error("Incomplete transfer: received {received} of {expected} bytes")]
    IncompleteTransfer {
        expected: u16,
        received: usize,
        partial: Vec<u8>,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl LogError {
    /// Bytes that did arrive before the transfer failed
    pub fn partial(&self) -> Option<&[u8]> {
        match self {
            Self::IncompleteTransfer { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

/// A log payload with its announced size.
/// The received buffer never grows past the announced size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTransfer {
    expected_size: u16,
    received: Vec<u8>,
}

impl LogTransfer {
    pub fn new(expected_size: u16) -> Self {
        Self {
            expected_size,
            received: Vec::with_capacity(expected_size as usize),
        }
    }

    pub fn expected_size(&self) -> u16 {
        self.expected_size
    }

    pub fn received(&self) -> &[u8] {
        &self.received
    }

    pub fn remaining(&self) -> usize {
        self.expected_size as usize - self.received.len()
    }

    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }

    /// Append a chunk, dropping anything past the announced size.
    /// Returns the number of bytes kept.
    pub fn push(&mut self, chunk: &[u8]) -> usize {
        let kept = chunk.len().min(self.remaining());
        self.received.extend_from_slice(&chunk[..kept]);
        kept
    }

    /// Payload decoded as text; invalid UTF-8 is replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.received).into_owned()
    }

    /// Turn an unfinished transfer into the error that carries its bytes
    pub fn into_incomplete(self) -> LogError {
        LogError::IncompleteTransfer {
            expected: self.expected_size,
            received: self.received.len(),
            partial: self.received,
        }
    }
}

/// First PREVIEW_CHARS characters of a log, with "..." when cut
pub fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

/// Default file name for a log downloaded at `at`
pub fn suggested_filename(at: NaiveDateTime) -> String {
    format!("log_{}.txt", at.format("%Y%m%d_%H%M%S"))
}
