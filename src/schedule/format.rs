// Schedule Text Format - Export and import of the schedule queue
//
// File layout:
//   # header comment block (title, timestamp, field order, example)
//   month,start_day,start_hour,start_min,end_day,stop_hour,stop_min,folder,file
//   # Schedule N: human readable rendering
//
// Comment and blank lines are ignored on import. A bad data line is skipped
// and reported; it never aborts the rest of the import.

use crate::schedule::{ScheduleEntry, ScheduleError, ScheduleStore};
use chrono::NaiveDateTime;
use std::io::{self, BufRead, Write};
use thiserror::Error;
use tracing::{info, warn};

/// First line of every exported file
pub const EXPORT_TITLE: &str = "# Ambiance Schedule Export";

const FIELD_COUNT: usize = 9;

/// Why a data line was skipped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportLineReason {
    #[error("expected 9 comma-separated values, found {0}")]
    FieldCount(usize),

    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    #[error(transparent)]
    Rejected(#[from] ScheduleError),
}

/// A skipped line of an import
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Line {line}: {reason}")]
pub struct ImportLineError {
    pub line: usize,
    pub reason: ImportLineReason,
}

/// Outcome of an import
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Entries added to the queue
    pub imported: usize,
    /// Lines that were skipped, with the reason
    pub skipped: Vec<ImportLineError>,
}

/// Parse one data line into an entry (range and ordering checks included,
/// overlap checks are left to the store)
pub fn parse_line(line: &str) -> Result<ScheduleEntry, ImportLineReason> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() != FIELD_COUNT {
        return Err(ImportLineReason::FieldCount(parts.len()));
    }

    let mut fields = [0i64; FIELD_COUNT];
    for (slot, part) in fields.iter_mut().zip(parts) {
        *slot = part
            .trim()
            .parse()
            .map_err(|_| ImportLineReason::InvalidNumber(part.trim().to_string()))?;
    }

    Ok(ScheduleEntry::from_fields(fields)?)
}

impl ScheduleStore {
    /// Write the queue in the text exchange format
    pub fn export<W: Write>(&self, writer: &mut W, generated_at: NaiveDateTime) -> io::Result<()> {
        writeln!(writer, "{}", EXPORT_TITLE)?;
        writeln!(writer, "# Exported on: {}", generated_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(
            writer,
            "# Format: month,start_day,start_hour,start_min,end_day,end_hour,end_min,folder,file"
        )?;
        writeln!(writer, "# Example: 7,21,9,0,28,21,0,1,2")?;
        writeln!(writer)?;

        for (index, entry) in self.entries().iter().enumerate() {
            let line = entry
                .to_fields()
                .iter()
                .map(|field| field.to_string())
                .collect::<Vec<_>>()
                .join(",");
            writeln!(writer, "{}", line)?;
            writeln!(writer, "# Schedule {}: {}", index + 1, entry)?;
            writeln!(writer)?;
        }

        Ok(())
    }

    /// Export into a string
    pub fn export_to_string(&self, generated_at: NaiveDateTime) -> String {
        let mut buffer = Vec::new();
        // Writing into a Vec cannot fail
        let _ = self.export(&mut buffer, generated_at);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Read entries from the text exchange format and queue the valid ones.
    /// Only a failing reader is an error; bad lines end up in the report.
    /// Lines are decoded lossily, so stray non-UTF-8 bytes never stop the
    /// import.
    pub fn import<R: BufRead>(&mut self, mut reader: R) -> io::Result<ImportReport> {
        let mut report = ImportReport::default();
        let mut raw = Vec::new();
        let mut line_number = 0;

        loop {
            raw.clear();
            if reader.read_until(b'\n', &mut raw)? == 0 {
                break;
            }
            line_number += 1;
            let decoded = String::from_utf8_lossy(&raw);
            let line = decoded.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let outcome = parse_line(line)
                .and_then(|entry| self.add(entry.clone()).map(|_| entry).map_err(Into::into));

            match outcome {
                Ok(entry) => {
                    info!(line = line_number, entry = %entry, "schedule imported");
                    report.imported += 1;
                }
                Err(reason) => {
                    let skipped = ImportLineError { line: line_number, reason };
                    warn!("{}, skipping", skipped);
                    report.skipped.push(skipped);
                }
            }
        }

        Ok(report)
    }
}
