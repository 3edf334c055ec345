// Schedule Entry - One recurring playback window
//
// Entries are validated on construction, so every ScheduleEntry that exists
// already satisfies the field ranges, the quarter-hour rule and the ordering
// of its day and time bounds.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Validation errors for schedule entries
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("{field} out of range: {value} (expected {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("{field} must be 00, 15, 30 or 45, got {value}")]
    InvalidMinute { field: &'static str, value: i64 },

    #[error("Stop time {stop} must be after start time {start}")]
    StopNotAfterStart { start: TimeOfDay, stop: TimeOfDay },

    #[error("Start day {start_day} must be before or equal to end day {end_day}")]
    DayRangeReversed { start_day: u8, end_day: u8 },

    #[error("Overlaps queued schedule {existing}")]
    Overlap { existing: ScheduleEntry },
}

fn ranged(field: &'static str, value: i64, min: i64, max: i64) -> Result<u8, ScheduleError> {
    if value < min || value > max {
        return Err(ScheduleError::OutOfRange { field, value, min, max });
    }
    Ok(value as u8)
}

// ============================================================================
// TIME OF DAY
// ============================================================================

/// Quarter-hour resolution time of day
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    /// The only minute values the device can store
    pub const VALID_MINUTES: [u8; 4] = [0, 15, 30, 45];

    pub fn new(hour: u8, minute: u8) -> Result<Self, ScheduleError> {
        Self::checked(hour as i64, minute as i64, "hour", "minute")
    }

    fn checked(
        hour: i64,
        minute: i64,
        hour_field: &'static str,
        minute_field: &'static str,
    ) -> Result<Self, ScheduleError> {
        let hour = ranged(hour_field, hour, 0, 23)?;
        if !Self::VALID_MINUTES.iter().any(|m| *m as i64 == minute) {
            return Err(ScheduleError::InvalidMinute { field: minute_field, value: minute });
        }
        Ok(Self { hour, minute: minute as u8 })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

// ============================================================================
// SCHEDULE ENTRY
// ============================================================================

/// A playback window bound to one folder/file selection
///
/// Month 0 means "every month".
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleEntry {
    month: u8,
    start_day: u8,
    end_day: u8,
    start: TimeOfDay,
    stop: TimeOfDay,
    folder: u8,
    file: u8,
}

impl ScheduleEntry {
    pub fn new(
        month: u8,
        start_day: u8,
        end_day: u8,
        start: TimeOfDay,
        stop: TimeOfDay,
        folder: u8,
        file: u8,
    ) -> Result<Self, ScheduleError> {
        let month = ranged("month", month as i64, 0, 12)?;
        let start_day = ranged("start_day", start_day as i64, 1, 31)?;
        let end_day = ranged("end_day", end_day as i64, 1, 31)?;

        if stop <= start {
            return Err(ScheduleError::StopNotAfterStart { start, stop });
        }
        if start_day > end_day {
            return Err(ScheduleError::DayRangeReversed { start_day, end_day });
        }

        Ok(Self { month, start_day, end_day, start, stop, folder, file })
    }

    /// Build from the nine fields of the text format, in file order:
    /// month, start_day, start_hour, start_min, end_day, stop_hour,
    /// stop_min, folder, file
    pub fn from_fields(fields: [i64; 9]) -> Result<Self, ScheduleError> {
        let [month, start_day, start_hour, start_min, end_day, stop_hour, stop_min, folder, file] =
            fields;

        let start = TimeOfDay::checked(start_hour, start_min, "start_hour", "start_min")?;
        let stop = TimeOfDay::checked(stop_hour, stop_min, "stop_hour", "stop_min")?;

        Self::new(
            ranged("month", month, 0, 12)?,
            ranged("start_day", start_day, 1, 31)?,
            ranged("end_day", end_day, 1, 31)?,
            start,
            stop,
            ranged("folder", folder, 0, 255)?,
            ranged("file", file, 0, 255)?,
        )
    }

    /// The nine fields of the text format, in file order
    pub fn to_fields(&self) -> [u8; 9] {
        [
            self.month,
            self.start_day,
            self.start.hour,
            self.start.minute,
            self.end_day,
            self.stop.hour,
            self.stop.minute,
            self.folder,
            self.file,
        ]
    }

    pub fn month(&self) -> u8 {
        self.month
    }

    pub fn start_day(&self) -> u8 {
        self.start_day
    }

    pub fn end_day(&self) -> u8 {
        self.end_day
    }

    pub fn start(&self) -> TimeOfDay {
        self.start
    }

    pub fn stop(&self) -> TimeOfDay {
        self.stop
    }

    pub fn folder(&self) -> u8 {
        self.folder
    }

    pub fn file(&self) -> u8 {
        self.file
    }

    /// Inclusive day ranges intersect
    pub fn days_overlap(&self, other: &ScheduleEntry) -> bool {
        !(self.end_day < other.start_day || self.start_day > other.end_day)
    }

    /// Half-open time windows intersect (touching endpoints do not)
    pub fn times_overlap(&self, other: &ScheduleEntry) -> bool {
        !(self.stop <= other.start || self.start >= other.stop)
    }

    /// Two entries conflict when they share a month and both their day and
    /// time ranges intersect. Month 0 is compared as a plain value.
    pub fn conflicts_with(&self, other: &ScheduleEntry) -> bool {
        self.month == other.month && self.days_overlap(other) && self.times_overlap(other)
    }
}

impl fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}/{:02}-{:02} | {} - {} | Folder #{}, File #{}",
            self.month, self.start_day, self.end_day, self.start, self.stop, self.folder, self.file
        )
    }
}
