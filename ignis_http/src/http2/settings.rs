//! SETTINGS frame payload codec (RFC 7540 §6.5), continuing
//! `selenia_http::http2::Settings`.

pub const HEADER_TABLE_SIZE: u16 = 0x1;
pub const ENABLE_PUSH: u16 = 0x2;
pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
pub const MAX_FRAME_SIZE: u16 = 0x5;
pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;

#[derive(Debug, Default, Clone)]
pub struct Settings(pub Vec<(u16, u32)>);

impl Settings {
    pub fn encode(&self, out: &mut Vec<u8>) {
        for (id, val) in &self.0 {
            out.extend_from_slice(&id.to_be_bytes());
            out.extend_from_slice(&val.to_be_bytes());
        }
    }

    /// `None` signals a malformed (non-multiple-of-6) payload; the caller
    /// maps that to `BadSettingsLength` during `expect-settings`.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() % 6 != 0 {
            return None;
        }
        let mut values = Vec::with_capacity(buf.len() / 6);
        for chunk in buf.chunks_exact(6) {
            let id = u16::from_be_bytes([chunk[0], chunk[1]]);
            let val = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
            values.push((id, val));
        }
        Some(Settings(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let settings = Settings(vec![(INITIAL_WINDOW_SIZE, 65_535), (MAX_CONCURRENT_STREAMS, 100)]);
        let mut buf = Vec::new();
        settings.encode(&mut buf);
        let decoded = Settings::decode(&buf).unwrap();
        assert_eq!(decoded.0, settings.0);
    }

    #[test]
    fn rejects_misaligned_payload() {
        assert!(Settings::decode(&[0u8; 5]).is_none());
    }
}
