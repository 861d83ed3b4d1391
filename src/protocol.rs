// MIT License

//! Command bytes, packed field helpers, and event decoding for the Texecom
//! "simple protocol" carried inside the frame codec.

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Serialize, Serializer};

use crate::constants::log_event_description;
use crate::devices::{AreaState, AreaStatus, ArmType, ZoneFlags, ZoneState};
use crate::event::{AreaEvent, LogEvent, PanelEvent, ZoneEvent};

/// Command bytes understood by the panel in UDL mode.
pub const CMD_LOGIN: u8 = 0x01;
pub const CMD_GET_ZONE_STATE: u8 = 0x02;
pub const CMD_GET_ZONE_DETAILS: u8 = 0x03;
pub const CMD_ARM: u8 = 0x06;
pub const CMD_DISARM: u8 = 0x08;
pub const CMD_RESET: u8 = 0x09;
pub const CMD_GET_AREA_FLAGS: u8 = 0x0B;
pub const CMD_SET_LCD: u8 = 0x0E;
pub const CMD_GET_PANEL_IDENTIFICATION: u8 = 0x16;
pub const CMD_SET_DATETIME: u8 = 0x18;
pub const CMD_GET_SYSTEM_POWER: u8 = 0x19;
pub const CMD_GET_AREA_TEXT: u8 = 0x22;

/// Un-framed probe sent once per connection before any framed traffic.
pub const SERIAL_PROBE: [u8; 3] = [0x03, 0x5A, 0xA2];
/// Expected first two bytes of the probe response.
pub const SERIAL_PROBE_REPLY: [u8; 2] = [0x0B, 0x5A];

/// Mutating commands must be acknowledged with a leading `0x06` byte.
pub fn is_mutating(cmd: u8) -> bool {
    matches!(
        cmd,
        CMD_ARM | CMD_DISARM | CMD_RESET | CMD_SET_LCD | CMD_SET_DATETIME
    )
}

/// A decoded zone bitmap byte: state in the low two bits, flags above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneBitmap {
    pub state: ZoneState,
    pub flags: ZoneFlags,
}

pub fn parse_zone_bitmap(byte: u8) -> ZoneBitmap {
    ZoneBitmap {
        state: ZoneState::from_bits(byte),
        flags: ZoneFlags::from_bits_truncate(byte),
    }
}

/// Width in bytes of the outbound area bitmap.
pub fn area_bitmap_len(area_count: usize) -> usize {
    if area_count <= 32 {
        area_count.div_ceil(8)
    } else {
        8
    }
}

/// Little-endian area bitmap with the bit for `area` (1-based) set.
///
/// Callers validate `area` against the panel's area count first.
pub fn area_bitmap(area_count: usize, area: u8) -> Vec<u8> {
    let mut buf = vec![0u8; area_bitmap_len(area_count)];
    let bit = (area as usize) - 1;
    buf[bit / 8] |= 1 << (bit % 8);
    buf
}

/// How many bytes the panel uses to encode a zone number.
pub fn zone_number_size(zone_count: u16) -> usize {
    if zone_count > 256 { 2 } else { 1 }
}

/// Body for the arm command: area bitmap followed by the arm type.
pub fn arm_body(area_count: usize, area: u8, arm_type: ArmType) -> Vec<u8> {
    let mut body = area_bitmap(area_count, area);
    body.push(arm_type as u8);
    body
}

/// Body for the disarm and reset commands: just the area bitmap.
pub fn disarm_body(area_count: usize, area: u8) -> Vec<u8> {
    area_bitmap(area_count, area)
}

/// Body for the set date/time command.
pub fn set_datetime_body(t: &DateTime<Utc>) -> [u8; 6] {
    [
        t.day() as u8,
        t.month() as u8,
        (t.year() % 100) as u8,
        t.hour() as u8,
        t.minute() as u8,
        t.second() as u8,
    ]
}

/// Body for the set LCD command: 32 bytes, clipped and space-padded.
pub fn set_lcd_body(text: &str) -> [u8; 32] {
    let mut body = [b' '; 32];
    let bytes = text.as_bytes();
    let n = bytes.len().min(32);
    body[..n].copy_from_slice(&bytes[..n]);
    body
}

/// Timestamp packed into 4 little-endian bytes:
/// `sec[0..6) | min[6..12) | hour[12..17) | day[17..22) | month[22..26) |
/// year[26..32)`, year offset from 2000, UTC.
///
/// Raw fields are preserved as reported; the panel can emit out-of-range
/// values (month 0, day 0) which have no `DateTime` representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelTimestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

pub fn parse_timestamp(data: [u8; 4]) -> PanelTimestamp {
    let packed = u32::from_le_bytes(data);
    PanelTimestamp {
        second: (packed & 63) as u8,
        minute: ((packed >> 6) & 63) as u8,
        hour: ((packed >> 12) & 31) as u8,
        day: ((packed >> 17) & 31) as u8,
        month: ((packed >> 22) & 15) as u8,
        year: 2000 + ((packed >> 26) & 63) as u16,
    }
}

impl PanelTimestamp {
    /// Convert to a UTC datetime, or `None` if the raw fields do not form a
    /// valid date.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(
            self.year as i32,
            self.month as u32,
            self.day as u32,
            self.hour as u32,
            self.minute as u32,
            self.second as u32,
        )
        .single()
    }
}

impl std::fmt::Display for PanelTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

impl Serialize for PanelTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.to_utc() {
            Some(t) => serializer.serialize_str(&t.to_rfc3339()),
            None => serializer.serialize_str(&self.to_string()),
        }
    }
}

/// Decode one 8-byte little-endian area flags word.
///
/// Alarm takes precedence over armed, armed over part-armed. The part-arm
/// level is reported independently of the resulting state.
pub fn parse_area_flags(flags: u64) -> AreaStatus {
    let part_arm = if flags & (1 << 50) != 0 {
        1
    } else if flags & (1 << 51) != 0 {
        2
    } else if flags & (1 << 52) != 0 {
        3
    } else {
        0
    };

    let state = if flags & 1 != 0 {
        AreaState::InAlarm
    } else if flags & (0b111 << 21) != 0 {
        AreaState::Armed
    } else if part_arm != 0 {
        AreaState::PartArmed
    } else {
        AreaState::Disarmed
    };

    AreaStatus { state, part_arm }
}

/// Event discriminators at `'M'` payload byte 0.
const EVENT_ZONE: u8 = 1;
const EVENT_AREA: u8 = 2;
const EVENT_LOG: u8 = 5;

/// Classify an `'M'` frame payload. Returns `None` for unknown discriminators
/// or short payloads; the caller counts and drops those.
///
/// `zone_count` is the panel's zone count, or 0 before identification has
/// run; it gates the short zone-number form via [`zone_number_size`].
pub fn parse_event(payload: &[u8], zone_count: u16) -> Option<PanelEvent> {
    let (&discriminator, data) = payload.split_first()?;
    match discriminator {
        EVENT_ZONE => parse_zone_event(data, zone_count).map(PanelEvent::Zone),
        EVENT_AREA => parse_area_event(data).map(PanelEvent::Area),
        EVENT_LOG => parse_log_event(data).map(PanelEvent::Log),
        _ => None,
    }
}

/// Zone number followed by a zone bitmap byte. The number is u16 LE; the
/// single-byte short form is only accepted when [`zone_number_size`] says
/// the panel encodes zone numbers in one byte.
fn parse_zone_event(data: &[u8], zone_count: u16) -> Option<ZoneEvent> {
    let (zone_number, bitmap) = match data.len() {
        0 | 1 => return None,
        2 if zone_number_size(zone_count) == 1 => (data[0] as u16, data[1]),
        2 => return None,
        _ => (u16::from_le_bytes([data[0], data[1]]), data[2]),
    };
    let decoded = parse_zone_bitmap(bitmap);
    Some(ZoneEvent {
        zone_number,
        state: decoded.state,
        flags: decoded.flags,
    })
}

/// Area number, area state, optional part-arm level.
fn parse_area_event(data: &[u8]) -> Option<AreaEvent> {
    if data.len() < 2 {
        return None;
    }
    let state = AreaState::from_u8(data[1])?;
    Some(AreaEvent {
        area_number: data[0],
        state,
        part_arm: data.get(2).copied().unwrap_or(0),
    })
}

/// Log entry: type, group type, parameter, area mask, packed timestamp.
fn parse_log_event(data: &[u8]) -> Option<LogEvent> {
    if data.len() < 10 {
        return None;
    }
    let event_type = data[0];
    Some(LogEvent {
        event_type,
        group_type: data[1],
        parameter: u16::from_le_bytes([data[2], data[3]]),
        areas: u16::from_le_bytes([data[4], data[5]]),
        time: parse_timestamp([data[6], data[7], data[8], data[9]]),
        description: log_event_description(event_type),
    })
}
