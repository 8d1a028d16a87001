//! Hand-rolled binary framing: varint-prefixed length fields, little-endian
//! multi-byte integers, length-prefixed UTF-8 strings, and 12 raw bytes per
//! timestamp. [`CrdtMessage`] payloads are carried opaquely as ciphertext and
//! are not part of this module's concern.
//!
//! [`CrdtMessage`]: crate::message::CrdtMessage

use evolu_clock::Timestamp;

use crate::error::{ProtocolError, Result};
use crate::frame::{ErrorKind, Frame, FingerprintRange, NeedRange};
use crate::message::EncryptedCrdtMessage;

/// The protocol version this build speaks. Every frame starts with it;
/// mismatch is a [`ProtocolError::Version`].
pub const PROTOCOL_VERSION: u64 = 1;

const DISC_INITIATE: u8 = 0;
const DISC_RANGE_FINGERPRINTS: u8 = 1;
const DISC_NEED_MESSAGES: u8 = 2;
const DISC_MESSAGES: u8 = 3;
const DISC_ACK: u8 = 4;
const DISC_ERROR: u8 = 5;

const ERR_AUTH: u8 = 0;
const ERR_QUOTA: u8 = 1;
const ERR_FRAME_DECODE: u8 = 2;
const ERR_PROTOCOL_VERSION: u8 = 3;

/// Encode `frame` as a complete, self-delimiting byte string.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut buf = Vec::new();
    write_varint(&mut buf, PROTOCOL_VERSION);
    match frame {
        Frame::Initiate { owner_id, write_key, client_fingerprint_ranges } => {
            buf.push(DISC_INITIATE);
            buf.extend_from_slice(owner_id);
            buf.extend_from_slice(write_key);
            write_ranges(&mut buf, client_fingerprint_ranges);
        }
        Frame::RangeFingerprints { owner_id, lower, ranges } => {
            buf.push(DISC_RANGE_FINGERPRINTS);
            buf.extend_from_slice(owner_id);
            write_option_bound(&mut buf, *lower);
            write_ranges(&mut buf, ranges);
        }
        Frame::NeedMessages { owner_id, ranges } => {
            buf.push(DISC_NEED_MESSAGES);
            buf.extend_from_slice(owner_id);
            write_varint(&mut buf, ranges.len() as u64);
            for r in ranges {
                buf.extend_from_slice(&r.lower);
                write_option_bound(&mut buf, r.upper);
            }
        }
        Frame::Messages { owner_id, encrypted_messages, done } => {
            buf.push(DISC_MESSAGES);
            buf.extend_from_slice(owner_id);
            write_varint(&mut buf, encrypted_messages.len() as u64);
            for m in encrypted_messages {
                buf.extend_from_slice(&m.timestamp.to_binary12());
                write_varint(&mut buf, m.ciphertext.len() as u64);
                buf.extend_from_slice(&m.ciphertext);
            }
            buf.push(u8::from(*done));
        }
        Frame::Ack { owner_id, up_to } => {
            buf.push(DISC_ACK);
            buf.extend_from_slice(owner_id);
            buf.extend_from_slice(up_to);
        }
        Frame::Error { kind, detail } => {
            buf.push(DISC_ERROR);
            buf.push(encode_error_kind(*kind));
            write_string(&mut buf, detail);
        }
    }
    buf
}

/// Decode one complete frame from the front of `bytes`, returning the frame
/// and the number of bytes consumed.
pub fn decode_frame(bytes: &[u8]) -> Result<(Frame, usize)> {
    let mut cur = Cursor::new(bytes);
    let version = cur.read_varint()?;
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::Version { peer: version, expected: PROTOCOL_VERSION });
    }
    let disc = cur.read_u8()?;
    let frame = match disc {
        DISC_INITIATE => {
            let owner_id = cur.read_array::<16>()?;
            let write_key = cur.read_array::<16>()?;
            let client_fingerprint_ranges = cur.read_ranges()?;
            Frame::Initiate { owner_id, write_key, client_fingerprint_ranges }
        }
        DISC_RANGE_FINGERPRINTS => {
            let owner_id = cur.read_array::<16>()?;
            let lower = cur.read_option_bound()?;
            let ranges = cur.read_ranges()?;
            Frame::RangeFingerprints { owner_id, lower, ranges }
        }
        DISC_NEED_MESSAGES => {
            let owner_id = cur.read_array::<16>()?;
            let count = cur.read_varint()?;
            let mut ranges = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let lower = cur.read_array::<12>()?;
                let upper = cur.read_option_bound()?;
                ranges.push(NeedRange { lower, upper });
            }
            Frame::NeedMessages { owner_id, ranges }
        }
        DISC_MESSAGES => {
            let owner_id = cur.read_array::<16>()?;
            let count = cur.read_varint()?;
            let mut encrypted_messages = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let ts_bytes = cur.read_array::<12>()?;
                let (millis, counter, node_prefix) = Timestamp::from_binary12(&ts_bytes);
                let mut node = [0u8; 16];
                node[..4].copy_from_slice(&node_prefix);
                let timestamp = Timestamp::new(millis, counter, node)
                    .map_err(|e| ProtocolError::FrameDecode(e.to_string()))?;
                let len = cur.read_varint()? as usize;
                let ciphertext = cur.read_bytes(len)?.to_vec();
                encrypted_messages.push(EncryptedCrdtMessage { timestamp, ciphertext });
            }
            let done = cur.read_u8()? != 0;
            Frame::Messages { owner_id, encrypted_messages, done }
        }
        DISC_ACK => {
            let owner_id = cur.read_array::<16>()?;
            let up_to = cur.read_array::<12>()?;
            Frame::Ack { owner_id, up_to }
        }
        DISC_ERROR => {
            let kind = decode_error_kind(cur.read_u8()?)?;
            let detail = cur.read_string()?;
            Frame::Error { kind, detail }
        }
        other => return Err(ProtocolError::FrameDecode(format!("unknown discriminant {other}"))),
    };
    Ok((frame, cur.pos))
}

fn write_ranges(buf: &mut Vec<u8>, ranges: &[FingerprintRange]) {
    write_varint(buf, ranges.len() as u64);
    for r in ranges {
        write_option_bound(buf, r.upper_bound);
        buf.extend_from_slice(&r.fingerprint);
    }
}

fn write_option_bound(buf: &mut Vec<u8>, bound: Option<[u8; 12]>) {
    match bound {
        Some(b) => {
            buf.push(1);
            buf.extend_from_slice(&b);
        }
        None => buf.push(0),
    }
}

fn encode_error_kind(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Auth => ERR_AUTH,
        ErrorKind::Quota => ERR_QUOTA,
        ErrorKind::FrameDecode => ERR_FRAME_DECODE,
        ErrorKind::ProtocolVersion => ERR_PROTOCOL_VERSION,
    }
}

fn decode_error_kind(byte: u8) -> Result<ErrorKind> {
    match byte {
        ERR_AUTH => Ok(ErrorKind::Auth),
        ERR_QUOTA => Ok(ErrorKind::Quota),
        ERR_FRAME_DECODE => Ok(ErrorKind::FrameDecode),
        ERR_PROTOCOL_VERSION => Ok(ErrorKind::ProtocolVersion),
        other => Err(ProtocolError::FrameDecode(format!("unknown error kind {other}"))),
    }
}

fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
    }
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_varint(buf, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_u8(&mut self) -> Result<u8> {
        let b = *self.bytes.get(self.pos).ok_or_else(|| ProtocolError::FrameDecode("truncated frame".into()))?;
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or_else(|| ProtocolError::FrameDecode("length overflow".into()))?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| ProtocolError::FrameDecode("truncated frame".into()))?;
        self.pos = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slice = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_varint(&mut self) -> Result<u64> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift >= 64 {
                return Err(ProtocolError::FrameDecode("varint too long".into()));
            }
        }
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_varint()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| ProtocolError::FrameDecode(e.to_string()))
    }

    fn read_option_bound(&mut self) -> Result<Option<[u8; 12]>> {
        match self.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.read_array::<12>()?)),
            other => Err(ProtocolError::FrameDecode(format!("invalid option tag {other}"))),
        }
    }

    fn read_ranges(&mut self) -> Result<Vec<FingerprintRange>> {
        let count = self.read_varint()?;
        let mut ranges = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let upper_bound = self.read_option_bound()?;
            let fingerprint = self.read_array::<12>()?;
            ranges.push(FingerprintRange { upper_bound, fingerprint });
        }
        Ok(ranges)
    }
}
