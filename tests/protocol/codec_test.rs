// Protocol Codec Tests
// Frame layouts, range checks and the packed schedule time byte

use ambiance::protocol::{decode_time, encode_time, opcode, CodecError, Command, ProtocolCodec};
use ambiance::schedule::{ScheduleEntry, TimeOfDay};
use chrono::NaiveDate;

fn entry(month: u8, start_day: u8, end_day: u8, start: (u8, u8), stop: (u8, u8)) -> ScheduleEntry {
    ScheduleEntry::new(
        month,
        start_day,
        end_day,
        TimeOfDay::new(start.0, start.1).unwrap(),
        TimeOfDay::new(stop.0, stop.1).unwrap(),
        1,
        2,
    )
    .unwrap()
}

// ============================================================================
// SIMPLE COMMANDS
// ============================================================================

#[test]
fn test_volume_range_law() {
    for level in 0..=100u8 {
        assert_eq!(
            ProtocolCodec::encode(&Command::SetVolume(level)).unwrap(),
            vec![0x00, level]
        );
    }
    for level in 101..=255u8 {
        let err = ProtocolCodec::encode(&Command::SetVolume(level)).unwrap_err();
        assert_eq!(
            err,
            CodecError::OutOfRange {
                field: "volume",
                value: level as u32,
                min: 0,
                max: 100
            }
        );
    }
}

#[test]
fn test_duty_cycle_frame() {
    assert_eq!(
        ProtocolCodec::encode(&Command::SetDutyCycle(75)).unwrap(),
        vec![opcode::SET_DUTY_CYCLE, 75]
    );
    assert!(ProtocolCodec::encode(&Command::SetDutyCycle(101)).is_err());
}

#[test]
fn test_select_track_frame() {
    let frame = ProtocolCodec::encode(&Command::SelectTrack { folder: 3, file: 250 }).unwrap();
    assert_eq!(frame, vec![0x01, 3, 250]);
}

#[test]
fn test_request_log_frame() {
    assert_eq!(ProtocolCodec::encode(&Command::RequestLog).unwrap(), vec![0x02]);
}

#[test]
fn test_set_time_field_order() {
    let frame = ProtocolCodec::encode(&Command::SetTime {
        minute: 42,
        hour: 13,
        day: 9,
        month: 11,
    })
    .unwrap();
    assert_eq!(frame, vec![0x0F, 42, 13, 9, 11]);
}

#[test]
fn test_set_time_rejects_month_zero() {
    let err = ProtocolCodec::encode(&Command::SetTime {
        minute: 0,
        hour: 0,
        day: 1,
        month: 0,
    })
    .unwrap_err();
    assert!(matches!(err, CodecError::OutOfRange { field: "month", value: 0, .. }));
    assert!(err.to_string().contains("month"));
}

#[test]
fn test_set_time_from_wall_clock() {
    let now = NaiveDate::from_ymd_opt(2025, 7, 4)
        .unwrap()
        .and_hms_opt(18, 5, 59)
        .unwrap();
    let frame = Command::set_time_at(&now).encode().unwrap();
    assert_eq!(frame, vec![0x0F, 5, 18, 4, 7]);
}

// ============================================================================
// PACKED TIME
// ============================================================================

#[test]
fn test_time_round_trip() {
    for hour in 0..=23u8 {
        for minute in [0u8, 15, 30, 45] {
            let byte = encode_time(hour, minute).unwrap();
            assert_eq!(decode_time(byte).unwrap(), (hour, minute));
        }
    }
}

#[test]
fn test_time_packing() {
    assert_eq!(encode_time(9, 0).unwrap(), 9 << 3);
    assert_eq!(encode_time(21, 45).unwrap(), (21 << 3) | 3);
}

#[test]
fn test_time_rejects_invalid_values() {
    assert!(matches!(encode_time(24, 0), Err(CodecError::OutOfRange { field: "hour", .. })));
    assert!(matches!(encode_time(10, 20), Err(CodecError::InvalidQuarter { value: 20, .. })));
    assert!(matches!(decode_time(0x07), Err(CodecError::InvalidTimeByte(0x07))));
    assert!(matches!(decode_time(24 << 3), Err(CodecError::InvalidTimeByte(_))));
}

// ============================================================================
// SCHEDULE BATCH
// ============================================================================

#[test]
fn test_batch_layout() {
    let entries = vec![entry(7, 21, 28, (9, 0), (21, 0)), entry(0, 1, 31, (6, 15), (7, 30))];
    let frame = ProtocolCodec::encode(&Command::ScheduleBatch(entries)).unwrap();

    assert_eq!(frame.len(), 2 + 2 * 7);
    assert_eq!(frame[0], opcode::BATCH_START);
    assert_eq!(&frame[1..8], &[7, 21, 9 << 3, 28, 21 << 3, 1, 2]);
    assert_eq!(&frame[8..15], &[0, 1, (6 << 3) | 1, 31, (7 << 3) | 2, 1, 2]);
    assert_eq!(*frame.last().unwrap(), opcode::BATCH_END);
}

#[test]
fn test_empty_batch() {
    assert_eq!(ProtocolCodec::encode_batch(&[]).unwrap(), vec![0x05, 0x0D]);
}

#[test]
fn test_log_size_is_big_endian() {
    assert_eq!(ProtocolCodec::decode_log_size(0x01, 0xF4), 500);
    assert_eq!(ProtocolCodec::decode_log_size(0x00, 0x00), 0);
}
