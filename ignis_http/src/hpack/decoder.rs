//! HPACK decoder (RFC 7541 §6).

use super::dynamic_table::DynamicTable;
use super::huffman;
use super::integer::{self, IntegerError};
use super::static_table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HpackError {
    #[error("truncated header block")]
    Truncated,
    #[error(transparent)]
    Integer(#[from] IntegerError),
    #[error("invalid Huffman encoding")]
    Huffman,
    #[error("header index {0} out of range")]
    InvalidIndex(u64),
    #[error("dynamic table size update exceeds the bound negotiated in SETTINGS")]
    TableSizeUpdateTooLarge,
}

/// One event produced while decoding a header-block fragment (spec.md
/// §4.2: "Returns `size-update` so the connection layer can ACK the
/// peer's SETTINGS"). A dynamic table size update is applied to this
/// decoder's table in place *and* surfaced as an event, rather than
/// silently consumed, so the HTTP/2 connection layer can react to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HpackEvent {
    Header(String, String),
    SizeUpdate(usize),
}

pub struct HpackDecoder {
    dynamic: DynamicTable,
    /// Upper bound this endpoint will accept via a dynamic table size
    /// update from the peer (its own SETTINGS_HEADER_TABLE_SIZE).
    max_allowed_size: usize,
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_string(buf: &[u8]) -> Result<(String, usize), HpackError> {
    if buf.is_empty() {
        return Err(HpackError::Truncated);
    }
    let huffman_flag = buf[0] & 0x80 != 0;
    let (len, consumed) = integer::decode(buf, 7)?;
    let len = len as usize;
    let start = consumed;
    let end = start.checked_add(len).ok_or(HpackError::Truncated)?;
    if end > buf.len() {
        return Err(HpackError::Truncated);
    }
    let raw = &buf[start..end];
    let s = if huffman_flag {
        let bytes = huffman::decode(raw).ok_or(HpackError::Huffman)?;
        String::from_utf8(bytes).map_err(|_| HpackError::Huffman)?
    } else {
        String::from_utf8(raw.to_vec()).map_err(|_| HpackError::Huffman)?
    };
    Ok((s, end))
}

impl HpackDecoder {
    pub fn new() -> Self {
        HpackDecoder { dynamic: DynamicTable::new(), max_allowed_size: super::dynamic_table::DEFAULT_MAX_SIZE }
    }

    pub fn set_max_allowed_size(&mut self, size: usize) {
        self.max_allowed_size = size;
        if self.dynamic.max_size() > size {
            self.dynamic.set_max_size(size);
        }
    }

    fn lookup(&self, index: u64) -> Result<(String, String), HpackError> {
        let index = index as usize;
        if index == 0 {
            return Err(HpackError::InvalidIndex(index as u64));
        }
        if index <= static_table::len() {
            let (n, v) = static_table::get(index).ok_or(HpackError::InvalidIndex(index as u64))?;
            return Ok((n.to_string(), v.to_string()));
        }
        let dyn_index = index - static_table::len();
        self.dynamic
            .get(dyn_index)
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .ok_or(HpackError::InvalidIndex(index as u64))
    }

    /// Decode one header-block fragment into an ordered event list:
    /// `HpackEvent::Header` for each emitted header, `HpackEvent::SizeUpdate`
    /// for each dynamic table size update (§6.3) — applied to this
    /// decoder's table in place, and also returned so the caller can act
    /// on it (spec.md §4.2).
    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<HpackEvent>, HpackError> {
        let mut events = Vec::new();
        let mut pos = 0;
        while pos < block.len() {
            let b = block[pos];
            if b & 0x80 != 0 {
                // Indexed Header Field (§6.1)
                let (idx, n) = integer::decode(&block[pos..], 7)?;
                let (name, value) = self.lookup(idx)?;
                events.push(HpackEvent::Header(name, value));
                pos += n;
            } else if b & 0x40 != 0 {
                // Literal with Incremental Indexing (§6.2.1)
                let (idx, n) = integer::decode(&block[pos..], 6)?;
                pos += n;
                let name = if idx == 0 {
                    let (s, consumed) = decode_string(&block[pos..])?;
                    pos += consumed;
                    s
                } else {
                    self.lookup(idx)?.0
                };
                let (value, consumed) = decode_string(&block[pos..])?;
                pos += consumed;
                self.dynamic.insert(name.clone(), value.clone());
                events.push(HpackEvent::Header(name, value));
            } else if b & 0x20 != 0 {
                // Dynamic Table Size Update (§6.3)
                let (new_size, n) = integer::decode(&block[pos..], 5)?;
                pos += n;
                if new_size as usize > self.max_allowed_size {
                    return Err(HpackError::TableSizeUpdateTooLarge);
                }
                self.dynamic.set_max_size(new_size as usize);
                events.push(HpackEvent::SizeUpdate(new_size as usize));
            } else {
                // Literal without Indexing (§6.2.2) or Never Indexed (§6.2.3):
                // both a 4-bit prefix, and both left un-indexed on decode.
                let (idx, n) = integer::decode(&block[pos..], 4)?;
                pos += n;
                let name = if idx == 0 {
                    let (s, consumed) = decode_string(&block[pos..])?;
                    pos += consumed;
                    s
                } else {
                    self.lookup(idx)?.0
                };
                let (value, consumed) = decode_string(&block[pos..])?;
                pos += consumed;
                events.push(HpackEvent::Header(name, value));
            }
        }
        Ok(events)
    }

    /// Convenience wrapper over [`Self::decode`] for callers that only
    /// want the header list (table size updates are still applied to the
    /// dynamic table, just not returned). Used where the caller has no
    /// need to react to an in-band size update, e.g. tests and benches.
    pub fn decode_headers(&mut self, block: &[u8]) -> Result<Vec<(String, String)>, HpackError> {
        Ok(self
            .decode(block)?
            .into_iter()
            .filter_map(|e| match e {
                HpackEvent::Header(n, v) => Some((n, v)),
                HpackEvent::SizeUpdate(_) => None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RFC 7541 Appendix C.2.1: literal header field with indexing.
    #[test]
    fn c_2_1_literal_with_indexing() {
        let wire = [
            0x40, 0x0a, b'c', b'u', b's', b't', b'o', b'm', b'-', b'k', b'e', b'y', 0x0d, b'c', b'u', b's',
            b't', b'o', b'm', b'-', b'h', b'e', b'a', b'd', b'e', b'r',
        ];
        let mut dec = HpackDecoder::new();
        let headers = dec.decode_headers(&wire).unwrap();
        assert_eq!(headers, vec![("custom-key".to_string(), "custom-header".to_string())]);
        assert_eq!(dec.dynamic.len(), 1);
    }

    /// RFC 7541 Appendix C.2.2: literal header field without indexing.
    #[test]
    fn c_2_2_literal_without_indexing() {
        let wire = [0x04, 0x0c, b'/', b's', b'a', b'm', b'p', b'l', b'e', b'/', b'p', b'a', b't', b'h'];
        let mut dec = HpackDecoder::new();
        let headers = dec.decode_headers(&wire).unwrap();
        assert_eq!(headers, vec![(":path".to_string(), "/sample/path".to_string())]);
        assert_eq!(dec.dynamic.len(), 0);
    }

    /// RFC 7541 Appendix C.2.4: indexed header field.
    #[test]
    fn c_2_4_indexed_header_field() {
        let wire = [0x82]; // index 2 = (:method, GET)
        let mut dec = HpackDecoder::new();
        let headers = dec.decode_headers(&wire).unwrap();
        assert_eq!(headers, vec![(":method".to_string(), "GET".to_string())]);
    }

    /// RFC 7541 Appendix C.3.1 (first request of the sequence, Huffman-free).
    #[test]
    fn c_3_1_request_examples_without_huffman() {
        let wire = [0x82, 0x86, 0x84, 0x41, 0x0f, b'w', b'w', b'w', b'.', b'e', b'x', b'a', b'm', b'p', b'l', b'e', b'.', b'c', b'o', b'm'];
        let mut dec = HpackDecoder::new();
        let headers = dec.decode_headers(&wire).unwrap();
        assert_eq!(
            headers,
            vec![
                (":method".to_string(), "GET".to_string()),
                (":scheme".to_string(), "http".to_string()),
                (":path".to_string(), "/".to_string()),
                (":authority".to_string(), "www.example.com".to_string()),
            ]
        );
    }

    #[test]
    fn dynamic_table_size_update_is_applied_and_surfaced() {
        let mut enc_buf = integer::encode(0, 5);
        enc_buf[0] |= 0x20;
        let mut dec = HpackDecoder::new();
        let events = dec.decode(&enc_buf).unwrap();
        assert_eq!(events, vec![HpackEvent::SizeUpdate(0)]);
        assert_eq!(dec.dynamic.max_size(), 0);
    }

    #[test]
    fn oversized_table_size_update_is_rejected() {
        let mut dec = HpackDecoder::new();
        dec.set_max_allowed_size(100);
        let mut enc_buf = integer::encode(4096, 5);
        enc_buf[0] |= 0x20;
        assert!(matches!(dec.decode(&enc_buf), Err(HpackError::TableSizeUpdateTooLarge)));
    }

    #[test]
    fn invalid_index_is_rejected() {
        let mut dec = HpackDecoder::new();
        assert!(matches!(dec.decode(&[0xff, 0x00]), Err(HpackError::InvalidIndex(_))));
    }
}
