// MIT License

//! Framed binary codec for the Crestron/Connect serial tunnel.
//!
//! Every frame has the layout:
//!
//! ```text
//! 't' | type | length | seq | payload... | crc
//! ```
//!
//! `length` is the total byte count of the frame including the leading `'t'`
//! and the trailing CRC. The CRC is CRC-8 with polynomial 0x85, initial value
//! 0xFF, MSB-first, computed over all bytes preceding it.

use tracing::warn;

/// Leading byte of every frame.
pub const FRAME_START: u8 = b't';

/// Smallest structurally valid frame: start, type, length, seq, crc.
pub const MIN_FRAME_LEN: usize = 5;

/// Largest body a command frame can carry (length is a single byte).
pub const MAX_BODY_LEN: usize = 255 - 6;

/// Single-byte ACK returned by the panel for mutating commands.
pub const ACK: u8 = 0x06;

/// Direction/kind discriminator in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Outbound command.
    Command = b'C',
    /// Inbound solicited response.
    Response = b'R',
    /// Inbound asynchronous message (event).
    Message = b'M',
}

impl FrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'C' => Some(Self::Command),
            b'R' => Some(Self::Response),
            b'M' => Some(Self::Message),
            _ => None,
        }
    }
}

/// A decoded frame. `payload` excludes the header and the CRC; for command
/// frames it starts with the command byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub seq: u8,
    pub payload: Vec<u8>,
}

/// Outcome of one decode attempt against a streaming buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A complete valid frame; `consumed` bytes should be drained.
    Frame(Frame, usize),
    /// Not enough bytes buffered yet.
    NeedMore,
    /// The first `n` bytes are garbage (bad sync, bad CRC, bad structure)
    /// and should be discarded before retrying.
    Skip(usize),
}

/// CRC-8, polynomial 0x85, initial value 0xFF, MSB-first, no reflection,
/// no final XOR.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &b in data {
        crc ^= b;
        for _ in 0..8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ 0x85;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// Encode a command frame: `'t' 'C' len seq cmd body.. crc`.
///
/// The body must fit the single-byte length field; callers size their inputs
/// (the largest spec'd body is the 32-byte LCD text).
pub fn encode_command(seq: u8, cmd: u8, body: &[u8]) -> Vec<u8> {
    debug_assert!(body.len() <= MAX_BODY_LEN);
    let len = 6 + body.len();
    let mut frame = Vec::with_capacity(len);
    frame.push(FRAME_START);
    frame.push(FrameType::Command as u8);
    frame.push(len as u8);
    frame.push(seq);
    frame.push(cmd);
    frame.extend_from_slice(body);
    frame.push(crc8(&frame));
    frame
}

/// Try to decode one frame from the front of `buf`.
///
/// Stream-oriented: returns [`Decoded::NeedMore`] until the full frame (per
/// its own length field) has arrived, and resynchronizes past garbage by
/// reporting how many bytes to skip up to the next `'t'`.
pub fn try_decode(buf: &[u8]) -> Decoded {
    if buf.is_empty() {
        return Decoded::NeedMore;
    }

    if buf[0] != FRAME_START {
        return Decoded::Skip(skip_to_next_start(buf));
    }

    if buf.len() < 3 {
        return Decoded::NeedMore;
    }

    let len = buf[2] as usize;
    if len < MIN_FRAME_LEN {
        warn!("Discarding frame with invalid length {}", len);
        return Decoded::Skip(resync_len(buf));
    }

    if buf.len() < len {
        return Decoded::NeedMore;
    }

    let frame = &buf[..len];
    let crc = frame[len - 1];
    if crc8(&frame[..len - 1]) != crc {
        warn!("Discarding frame with bad CRC: {:02x?}", frame);
        return Decoded::Skip(resync_len(buf));
    }

    let Some(frame_type) = FrameType::from_byte(frame[1]) else {
        warn!("Discarding frame with unknown type {:#04x}", frame[1]);
        return Decoded::Skip(resync_len(buf));
    };

    let decoded = Frame {
        frame_type,
        seq: frame[3],
        payload: frame[4..len - 1].to_vec(),
    };
    Decoded::Frame(decoded, len)
}

/// Bytes to discard when the buffer does not start with `'t'`.
fn skip_to_next_start(buf: &[u8]) -> usize {
    buf.iter()
        .skip(1)
        .position(|&b| b == FRAME_START)
        .map(|p| p + 1)
        .unwrap_or(buf.len())
}

/// Bytes to discard after a structural or CRC failure at the buffer head:
/// at least the bogus start byte, up to the next `'t'`.
fn resync_len(buf: &[u8]) -> usize {
    skip_to_next_start(buf).max(1)
}
