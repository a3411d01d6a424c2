//! The 9-octet HTTP/2 frame header (RFC 7540 §4.1), continuing
//! `selenia_http::http2::{FrameHeader, FrameType, parse_frame}`.

use std::convert::TryFrom;

/// RFC 7540 §4.2 default; this engine does not negotiate a larger value
/// (the resolved Open Question fixes the advertised bound at 16 KiB).
pub const MAX_FRAME_SIZE: u32 = 16 * 1024;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    RstStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    GoAway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
    Unknown(u8),
}

impl From<u8> for FrameType {
    fn from(v: u8) -> Self {
        match v {
            0x0 => FrameType::Data,
            0x1 => FrameType::Headers,
            0x2 => FrameType::Priority,
            0x3 => FrameType::RstStream,
            0x4 => FrameType::Settings,
            0x5 => FrameType::PushPromise,
            0x6 => FrameType::Ping,
            0x7 => FrameType::GoAway,
            0x8 => FrameType::WindowUpdate,
            0x9 => FrameType::Continuation,
            other => FrameType::Unknown(other),
        }
    }
}

impl FrameType {
    fn as_u8(self) -> u8 {
        match self {
            FrameType::Data => 0x0,
            FrameType::Headers => 0x1,
            FrameType::Priority => 0x2,
            FrameType::RstStream => 0x3,
            FrameType::Settings => 0x4,
            FrameType::PushPromise => 0x5,
            FrameType::Ping => 0x6,
            FrameType::GoAway => 0x7,
            FrameType::WindowUpdate => 0x8,
            FrameType::Continuation => 0x9,
            FrameType::Unknown(v) => v,
        }
    }
}

pub const FLAG_END_STREAM: u8 = 0x1;
pub const FLAG_END_HEADERS: u8 = 0x4;
pub const FLAG_ACK: u8 = 0x1;
pub const FLAG_PADDED: u8 = 0x8;
pub const FLAG_PRIORITY: u8 = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub type_: FrameType,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.length.to_be_bytes()[1..]);
        out.push(self.type_.as_u8());
        out.push(self.flags);
        out.extend_from_slice(&(self.stream_id & 0x7FFF_FFFF).to_be_bytes());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameCodecError {
    #[error("frame header truncated")]
    Invalid,
    #[error("frame length {0} exceeds MAX_FRAME_SIZE")]
    TooBig(u32),
}

/// Attempt to parse one complete frame from the front of `buf`. Returns the
/// header and the total number of bytes consumed (9 + payload length) when a
/// full frame is present, `Ok(None)` when more data is needed.
pub fn parse_frame(buf: &[u8]) -> Result<Option<(FrameHeader, usize)>, FrameCodecError> {
    if buf.len() < 9 {
        return Ok(None);
    }
    let length = ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | (buf[2] as u32);
    if length > MAX_FRAME_SIZE {
        return Err(FrameCodecError::TooBig(length));
    }
    let type_ = FrameType::from(buf[3]);
    let flags = buf[4];
    let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7FFF_FFFF;
    let total = 9 + length as usize;
    if buf.len() < total {
        return Ok(None);
    }
    Ok(Some((FrameHeader { length, type_, flags, stream_id }, total)))
}

pub fn build_frame(type_: FrameType, flags: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(9 + payload.len());
    let header = FrameHeader { length: payload.len() as u32, type_, flags, stream_id };
    header.serialize(&mut out);
    out.extend_from_slice(payload);
    out
}

pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

pub fn is_preface(buf: &[u8]) -> bool {
    buf.starts_with(PREFACE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips() {
        for &(ty, flags, stream_id, payload) in &[
            (FrameType::Headers, FLAG_END_HEADERS | FLAG_END_STREAM, 1u32, &b"hello"[..]),
            (FrameType::Data, 0u8, 3u32, &b""[..]),
            (FrameType::Settings, FLAG_ACK, 0u32, &b""[..]),
        ] {
            let wire = build_frame(ty, flags, stream_id, payload);
            let (header, consumed) = parse_frame(&wire).unwrap().unwrap();
            assert_eq!(consumed, wire.len());
            assert_eq!(header.length as usize, payload.len());
            assert_eq!(header.type_, ty);
            assert_eq!(header.flags, flags);
            assert_eq!(header.stream_id, stream_id);
        }
    }

    #[test]
    fn incomplete_header_requests_more_data() {
        assert_eq!(parse_frame(&[0u8; 5]).unwrap(), None);
    }

    #[test]
    fn incomplete_payload_requests_more_data() {
        let wire = build_frame(FrameType::Data, 0, 1, b"0123456789");
        assert_eq!(parse_frame(&wire[..12]).unwrap(), None);
    }

    #[test]
    fn oversized_length_is_rejected_before_buffering_payload() {
        let mut wire = vec![0xFFu8, 0xFF, 0xFF, 0x0, 0x0, 0, 0, 0, 0];
        wire.truncate(9);
        assert!(matches!(parse_frame(&wire), Err(FrameCodecError::TooBig(_))));
    }

    #[test]
    fn stream_id_reserved_bit_is_discarded() {
        let mut wire = build_frame(FrameType::Data, 0, 1, b"x");
        wire[5] |= 0x80;
        let (header, _) = parse_frame(&wire).unwrap().unwrap();
        assert_eq!(header.stream_id, 1);
    }

    #[test]
    fn recognizes_client_preface() {
        assert!(is_preface(PREFACE));
        assert!(!is_preface(b"GET / HTTP/1.1\r\n"));
    }
}
