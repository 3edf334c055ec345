// Commands - Everything the host can ask the device to do
//
// A Command is the typed form of one outbound frame. Encoding lives in the
// codec; this file only knows names, opcodes and how to build the commands
// that are derived from other values (time sync).

use crate::protocol::codec::{opcode, CodecError, ProtocolCodec};
use crate::schedule::ScheduleEntry;
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single outbound command frame
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Playback volume in percent (0-100)
    SetVolume(u8),
    /// Amplifier duty cycle in percent (0-100)
    SetDutyCycle(u8),
    /// Play a specific file from a specific folder
    SelectTrack { folder: u8, file: u8 },
    /// Device wall clock
    SetTime { minute: u8, hour: u8, day: u8, month: u8 },
    /// Replace the device schedule table with these entries
    ScheduleBatch(Vec<ScheduleEntry>),
    /// Ask the device to stream its event log
    RequestLog,
}

impl Command {
    /// Build a time sync command from a local wall-clock reading
    pub fn set_time_at(now: &NaiveDateTime) -> Self {
        Self::SetTime {
            minute: now.minute() as u8,
            hour: now.hour() as u8,
            day: now.day() as u8,
            month: now.month() as u8,
        }
    }

    /// The first byte of the encoded frame
    pub fn opcode(&self) -> u8 {
        match self {
            Self::SetVolume(_) => opcode::SET_VOLUME,
            Self::SetDutyCycle(_) => opcode::SET_DUTY_CYCLE,
            Self::SelectTrack { .. } => opcode::SELECT_TRACK,
            Self::SetTime { .. } => opcode::SET_TIME,
            Self::ScheduleBatch(_) => opcode::BATCH_START,
            Self::RequestLog => opcode::REQUEST_LOG,
        }
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        ProtocolCodec::encode(self)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetVolume(level) => write!(f, "volume {}%", level),
            Self::SetDutyCycle(level) => write!(f, "duty cycle {}%", level),
            Self::SelectTrack { folder, file } => write!(f, "Folder #{}, File #{}", folder, file),
            Self::SetTime { minute, hour, day, month } => write!(
                f,
                "time {:02}:{:02} Day:{:02} Month:{:02}",
                hour, minute, day, month
            ),
            Self::ScheduleBatch(entries) => write!(f, "schedule batch of {}", entries.len()),
            Self::RequestLog => write!(f, "log request"),
        }
    }
}
