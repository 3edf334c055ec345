// Schedule Store - In-memory queue of entries waiting to be sent
//
// Insertion order is preserved for display and export only; the device does
// not care about record order. The queue is never cleared implicitly: the
// caller clears it once the device has accepted a batch.

use crate::protocol::{CodecError, ProtocolCodec};
use crate::schedule::{ScheduleEntry, ScheduleError};
use tracing::debug;

/// Queue of validated, mutually non-overlapping schedule entries
#[derive(Clone, Debug, Default)]
pub struct ScheduleStore {
    entries: Vec<ScheduleEntry>,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued entries in insertion order
    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    /// First queued entry the candidate conflicts with
    pub fn find_overlap(&self, candidate: &ScheduleEntry) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|existing| existing.conflicts_with(candidate))
    }

    /// Queue an entry. The queue is unchanged when the entry is rejected.
    pub fn add(&mut self, entry: ScheduleEntry) -> Result<(), ScheduleError> {
        if let Some(existing) = self.find_overlap(&entry) {
            return Err(ScheduleError::Overlap { existing: existing.clone() });
        }
        debug!(entry = %entry, "schedule queued");
        self.entries.push(entry);
        Ok(())
    }

    /// Drop every queued entry, returning how many there were
    pub fn remove_all(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// The queue as one contiguous batch frame
    pub fn encode_batch(&self) -> Result<Vec<u8>, CodecError> {
        ProtocolCodec::encode_batch(&self.entries)
    }
}
