// Protocol Codec - Byte layout of every command frame
//
// Pure functions only, nothing here touches a transport. Values outside
// their documented range are rejected, never clamped.

use crate::protocol::Command;
use crate::schedule::ScheduleEntry;
use thiserror::Error;

/// Opcode bytes (first byte of every outbound frame)
pub mod opcode {
    pub const SET_VOLUME: u8 = 0x00;
    pub const SELECT_TRACK: u8 = 0x01;
    pub const REQUEST_LOG: u8 = 0x02;
    pub const SET_DUTY_CYCLE: u8 = 0x04;
    pub const BATCH_START: u8 = 0x05;
    pub const BATCH_END: u8 = 0x0D;
    pub const SET_TIME: u8 = 0x0F;
}

/// Size of one schedule record inside a batch frame
pub const RECORD_LEN: usize = 7;

/// Errors from encoding or decoding frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("{field} out of range: {value} (expected {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("{field} must be 0, 15, 30 or 45, got {value}")]
    InvalidQuarter { field: &'static str, value: u8 },

    #[error("Invalid packed time byte: 0x{0:02X}")]
    InvalidTimeByte(u8),
}

fn check_range(field: &'static str, value: u8, min: u8, max: u8) -> Result<u8, CodecError> {
    if value < min || value > max {
        return Err(CodecError::OutOfRange {
            field,
            value: value as u32,
            min: min as u32,
            max: max as u32,
        });
    }
    Ok(value)
}

/// Pack a schedule time into one byte: hour in the high 5 bits, quarter
/// index (minute / 15) in the low 3 bits
pub fn encode_time(hour: u8, minute: u8) -> Result<u8, CodecError> {
    check_range("hour", hour, 0, 23)?;
    if minute % 15 != 0 || minute > 45 {
        return Err(CodecError::InvalidQuarter { field: "minute", value: minute });
    }
    Ok((hour << 3) | (minute / 15))
}

/// Unpack a byte produced by [`encode_time`] into `(hour, minute)`
pub fn decode_time(byte: u8) -> Result<(u8, u8), CodecError> {
    let hour = byte >> 3;
    let quarter = byte & 0b111;
    if hour > 23 || quarter > 3 {
        return Err(CodecError::InvalidTimeByte(byte));
    }
    Ok((hour, quarter * 15))
}

/// Stateless encoder for command frames
pub struct ProtocolCodec;

impl ProtocolCodec {
    /// Encode a command into the exact bytes written to the transport
    pub fn encode(command: &Command) -> Result<Vec<u8>, CodecError> {
        match command {
            Command::SetVolume(level) => Ok(vec![
                opcode::SET_VOLUME,
                check_range("volume", *level, 0, 100)?,
            ]),
            Command::SetDutyCycle(level) => Ok(vec![
                opcode::SET_DUTY_CYCLE,
                check_range("duty cycle", *level, 0, 100)?,
            ]),
            Command::SelectTrack { folder, file } => {
                Ok(vec![opcode::SELECT_TRACK, *folder, *file])
            }
            Command::SetTime { minute, hour, day, month } => Ok(vec![
                opcode::SET_TIME,
                check_range("minute", *minute, 0, 59)?,
                check_range("hour", *hour, 0, 23)?,
                check_range("day", *day, 1, 31)?,
                check_range("month", *month, 1, 12)?,
            ]),
            Command::ScheduleBatch(entries) => Self::encode_batch(entries),
            Command::RequestLog => Ok(vec![opcode::REQUEST_LOG]),
        }
    }

    /// One 7-byte schedule record:
    /// month, start_day, start_time, end_day, stop_time, folder, file
    pub fn encode_record(entry: &ScheduleEntry) -> Result<[u8; RECORD_LEN], CodecError> {
        Ok([
            check_range("month", entry.month(), 0, 12)?,
            check_range("start_day", entry.start_day(), 1, 31)?,
            encode_time(entry.start().hour(), entry.start().minute())?,
            check_range("end_day", entry.end_day(), 1, 31)?,
            encode_time(entry.stop().hour(), entry.stop().minute())?,
            entry.folder(),
            entry.file(),
        ])
    }

    /// A complete batch frame. The whole frame is built up front so the
    /// transport can deliver it with a single write.
    pub fn encode_batch(entries: &[ScheduleEntry]) -> Result<Vec<u8>, CodecError> {
        let mut frame = Vec::with_capacity(2 + entries.len() * RECORD_LEN);
        frame.push(opcode::BATCH_START);
        for entry in entries {
            frame.extend_from_slice(&Self::encode_record(entry)?);
        }
        frame.push(opcode::BATCH_END);
        Ok(frame)
    }

    /// Size header of a log download (big-endian)
    pub fn decode_log_size(high: u8, low: u8) -> u16 {
        u16::from_be_bytes([high, low])
    }
}
