//! HPACK encoder (RFC 7541 §6).
//!
//! Per spec.md §4.2 and the resolved Open Question, this encoder always
//! emits literal-with-incremental-indexing when there is no exact
//! static/dynamic match — it never emits the "without indexing" or
//! "never indexed" representations on the outbound side. Strings are
//! Huffman-coded when that's smaller than the raw bytes.

use super::dynamic_table::DynamicTable;
use super::huffman;
use super::integer;
use super::static_table;

pub struct HpackEncoder {
    dynamic: DynamicTable,
}

impl Default for HpackEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_string(out: &mut Vec<u8>, s: &str) {
    let huff = huffman::encode(s.as_bytes());
    if huff.len() < s.len() {
        let mut len_bytes = integer::encode(huff.len(), 7);
        len_bytes[0] |= 0x80;
        out.extend_from_slice(&len_bytes);
        out.extend_from_slice(&huff);
    } else {
        out.extend_from_slice(&integer::encode(s.len(), 7));
        out.extend_from_slice(s.as_bytes());
    }
}

impl HpackEncoder {
    pub fn new() -> Self {
        HpackEncoder { dynamic: DynamicTable::new() }
    }

    /// Encode a header list into one header-block fragment.
    pub fn encode(&mut self, headers: &[(String, String)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, value) in headers {
            self.encode_one(&mut out, name, value);
        }
        out
    }

    fn encode_one(&mut self, out: &mut Vec<u8>, name: &str, value: &str) {
        if let Some(idx) = static_table::find_exact(name, value) {
            let mut bytes = integer::encode(idx, 7);
            bytes[0] |= 0x80;
            out.extend_from_slice(&bytes);
            return;
        }
        if let Some(idx) = self.dynamic.find_exact(name, value) {
            let mut bytes = integer::encode(static_table::len() + idx, 7);
            bytes[0] |= 0x80;
            out.extend_from_slice(&bytes);
            return;
        }

        let name_index = static_table::find_name(name)
            .or_else(|| self.dynamic.find_name(name).map(|i| static_table::len() + i));

        match name_index {
            Some(idx) => {
                let mut prefix = integer::encode(idx, 6);
                prefix[0] |= 0x40;
                out.extend_from_slice(&prefix);
            }
            None => {
                out.push(0x40);
                encode_string(out, name);
            }
        }
        encode_string(out, value);
        self.dynamic.insert(name.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::super::decoder::HpackDecoder;
    use super::*;

    #[test]
    fn encode_then_decode_preserves_order_and_values() {
        let headers = vec![
            (":method".to_string(), "GET".to_string()),
            (":path".to_string(), "/".to_string()),
            ("custom-key".to_string(), "custom-value".to_string()),
            ("custom-key".to_string(), "custom-value".to_string()),
        ];
        let mut enc = HpackEncoder::new();
        let block = enc.encode(&headers);
        let mut dec = HpackDecoder::new();
        let decoded = dec.decode_headers(&block).unwrap();
        assert_eq!(decoded, headers);
    }

    #[test]
    fn repeated_header_hits_dynamic_table_on_second_request() {
        let mut enc = HpackEncoder::new();
        let mut dec = HpackDecoder::new();

        let first = vec![("custom-header".to_string(), "x".to_string())];
        let block1 = enc.encode(&first);
        assert_eq!(dec.decode_headers(&block1).unwrap(), first);

        let block2 = enc.encode(&first);
        // Second encode should be a single indexed byte (dynamic table hit).
        assert_eq!(block2.len(), 1);
        assert_eq!(dec.decode_headers(&block2).unwrap(), first);
    }
}
