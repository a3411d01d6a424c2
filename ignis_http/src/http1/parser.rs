//! Zero-copy HTTP/1.1 request parsing (spec.md §4.5), continuing
//! `selenia_http::parser::{Parser, Request}`.
//!
//! Unlike the teacher, which forgets how far it got and returns `Ok(None)`
//! forever once it has moved past the request line without yet having the
//! full header block, this parser simply re-scans the accumulated buffer on
//! every call. The buffer for one request is small and append-only, so the
//! rescans are cheap, and the parser never loses the ability to make
//! progress as more bytes arrive.

use std::borrow::Cow;

use memchr::memchr;

use crate::method::{Method, Version};

#[derive(Debug, Clone)]
pub struct ParsedRequest<'a> {
    pub method: Method,
    pub target: &'a str,
    pub version: Version,
    pub headers: Vec<(&'a str, &'a str)>,
    pub body: Cow<'a, [u8]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Http1Error {
    #[error("malformed request line")]
    MalformedRequestLine,
    #[error("unrecognized HTTP method")]
    UnknownMethod,
    #[error("unrecognized HTTP version")]
    UnknownVersion,
    #[error("malformed header line")]
    MalformedHeader,
    #[error("malformed chunked transfer encoding")]
    MalformedChunk,
}

#[derive(Default)]
pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Parser
    }

    /// Try to parse one complete request from the front of `buf`. Returns
    /// `Ok(None)` when more bytes are needed.
    pub fn parse<'a>(&mut self, buf: &'a [u8]) -> Result<Option<(ParsedRequest<'a>, usize)>, Http1Error> {
        let Some(line_end) = memchr(b'\n', buf) else { return Ok(None) };
        let line = trim_cr(&buf[..line_end]);
        let mut parts = split_ws(line);
        let method_str = parts.next().ok_or(Http1Error::MalformedRequestLine)?;
        let target = parts.next().ok_or(Http1Error::MalformedRequestLine)?;
        let version_str = parts.next().ok_or(Http1Error::MalformedRequestLine)?;
        let method = Method::parse(method_str).map_err(|_| Http1Error::UnknownMethod)?;
        let version = Version::parse(version_str).ok_or(Http1Error::UnknownVersion)?;

        let headers_start = line_end + 1;
        let Some((header_block_len, term_len)) = find_header_block_end(&buf[headers_start..]) else {
            return Ok(None);
        };
        let header_block = &buf[headers_start..headers_start + header_block_len];
        let mut headers = Vec::new();
        for raw_line in header_block.split(|&b| b == b'\n') {
            let raw_line = trim_cr(raw_line);
            if raw_line.is_empty() {
                continue;
            }
            let bytes = raw_line.as_bytes();
            let colon = memchr(b':', bytes).ok_or(Http1Error::MalformedHeader)?;
            let (name, value) = (&raw_line[..colon], &raw_line[colon + 1..]);
            headers.push((name.trim(), value.trim()));
        }

        let mut consumed = headers_start + header_block_len + term_len;
        let body: Cow<'a, [u8]> = if matches!(method, Method::Post | Method::Put | Method::Patch) {
            let content_length = headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.parse::<usize>().ok());
            let chunked = headers
                .iter()
                .any(|(k, v)| k.eq_ignore_ascii_case("transfer-encoding") && v.eq_ignore_ascii_case("chunked"));

            if let Some(len) = content_length {
                if buf.len() < consumed + len {
                    return Ok(None);
                }
                let body = &buf[consumed..consumed + len];
                consumed += len;
                Cow::Borrowed(body)
            } else if chunked {
                match parse_chunked_body(&buf[consumed..])? {
                    Some((body, extra)) => {
                        consumed += extra;
                        Cow::Owned(body)
                    }
                    None => return Ok(None),
                }
            } else {
                Cow::Borrowed(&[])
            }
        } else {
            Cow::Borrowed(&[])
        };

        Ok(Some((ParsedRequest { method, target, version, headers, body }, consumed)))
    }
}

/// Find where the header block ends, returning `(header_block_len, terminator_len)`.
/// A request with zero headers puts the blank line terminating the header
/// block immediately after the request line, so the blank line itself can be
/// as short as `\r\n` (or bare `\n`) rather than the `\r\n\r\n` a header-block
/// boundary needs when at least one header line precedes it.
fn find_header_block_end(buf: &[u8]) -> Option<(usize, usize)> {
    if buf.starts_with(b"\r\n") {
        return Some((0, 2));
    }
    if buf.starts_with(b"\n") {
        return Some((0, 1));
    }
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| (pos, 4))
}

fn trim_cr(line: &[u8]) -> &str {
    let mut end = line.len();
    if end > 0 && line[end - 1] == b'\r' {
        end -= 1;
    }
    std::str::from_utf8(&line[..end]).unwrap_or("")
}

fn split_ws(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| c.is_ascii_whitespace()).filter(|v| !v.is_empty())
}

/// Decode one chunked body (RFC 9112 §7.1) from `input`. Returns the
/// reassembled body (each chunk's data concatenated, size lines and
/// chunk-terminating CRLFs stripped) plus bytes consumed from `input`,
/// or `None` if truncated.
fn parse_chunked_body(input: &[u8]) -> Result<Option<(Vec<u8>, usize)>, Http1Error> {
    let mut pos = 0;
    let mut decoded = Vec::new();
    loop {
        let Some(line_end) = memchr(b'\n', &input[pos..]).map(|i| pos + i) else { return Ok(None) };
        let line = trim_cr(&input[pos..line_end]);
        let size_str = line.split(';').next().unwrap_or(line).trim();
        let size = usize::from_str_radix(size_str, 16).map_err(|_| Http1Error::MalformedChunk)?;
        let chunk_data_start = line_end + 1;
        if size == 0 {
            if input.len() < chunk_data_start + 2 {
                return Ok(None);
            }
            return Ok(Some((decoded, chunk_data_start + 2)));
        }
        if input.len() < chunk_data_start + size + 2 {
            return Ok(None);
        }
        decoded.extend_from_slice(&input[chunk_data_start..chunk_data_start + size]);
        pos = chunk_data_start + size + 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get() {
        let mut p = Parser::new();
        let wire = b"GET /hi HTTP/1.1\r\nHost: x\r\n\r\n";
        let (req, consumed) = p.parse(wire).unwrap().unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.target, "/hi");
        assert_eq!(req.version, Version::Http11);
        assert_eq!(req.headers, vec![("Host", "x")]);
        assert_eq!(req.body.as_ref(), b"".as_slice());
        assert_eq!(consumed, wire.len());
    }

    #[test]
    fn incomplete_headers_ask_for_more_bytes_on_every_call() {
        let mut p = Parser::new();
        assert_eq!(p.parse(b"GET / HTTP/1.1\r\nHost: x\r\n").unwrap(), None);
        // Adding more bytes on a fresh call must still make progress.
        let full = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        assert!(p.parse(full).unwrap().is_some());
    }

    #[test]
    fn post_with_content_length_reads_body() {
        let mut p = Parser::new();
        let wire = b"POST /submit HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let (req, consumed) = p.parse(wire).unwrap().unwrap();
        assert_eq!(req.body.as_ref(), b"hello".as_slice());
        assert_eq!(consumed, wire.len());
    }

    #[test]
    fn chunked_body_is_decoded() {
        let mut p = Parser::new();
        let wire = b"POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        let (req, consumed) = p.parse(wire).unwrap().unwrap();
        assert_eq!(req.body.as_ref(), b"Wikipedia".as_slice());
        assert_eq!(consumed, wire.len());
    }

    #[test]
    fn three_chunk_body_reassembles_without_leaking_size_lines() {
        let mut p = Parser::new();
        let wire = b"POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n1\r\na\r\n2\r\nbc\r\n3\r\ndef\r\n0\r\n\r\n";
        let (req, consumed) = p.parse(wire).unwrap().unwrap();
        assert_eq!(req.body.as_ref(), b"abcdef".as_slice());
        assert_eq!(consumed, wire.len());
    }

    #[test]
    fn header_less_request_parses() {
        let mut p = Parser::new();
        let wire = b"GET / HTTP/1.1\r\n\r\n";
        let (req, consumed) = p.parse(wire).unwrap().unwrap();
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.target, "/");
        assert!(req.headers.is_empty());
        assert_eq!(req.body.as_ref(), b"".as_slice());
        assert_eq!(consumed, wire.len());
    }

    #[test]
    fn rejects_unknown_method() {
        let mut p = Parser::new();
        assert_eq!(p.parse(b"FROB / HTTP/1.1\r\n\r\n"), Err(Http1Error::UnknownMethod));
    }
}
