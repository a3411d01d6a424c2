//! The protocol-neutral request model (spec.md §3), continuing
//! `original_source/include/http/request.hpp`'s `context` member, restated
//! as a `TypeMap` (`ignis_core::context::ContextBag`).

use percent_encoding::percent_decode_str;

use ignis_core::context::ContextBag;

use crate::method::{Method, Version};
use crate::query::QueryParams;

/// A back-reference to the connection a request arrived on, used by
/// handlers that need the peer address or the socket (§3 "back-reference
/// to the originating connection slot").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRef {
    pub slot: usize,
    /// `None` for HTTP/1.1; `Some(stream_id)` for HTTP/2.
    pub stream_id: Option<u32>,
}

#[derive(Debug)]
pub struct Request {
    pub method: Method,
    /// Never contains `?` (the resolved Open Question: query is split out
    /// at parse time and kept separately).
    pub path: String,
    pub query: QueryParams,
    pub version: Version,
    /// Insertion-ordered; case-insensitive lookup is the caller's job.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub context: ContextBag,
    pub connection: ConnectionRef,
}

impl Request {
    pub fn new(
        method: Method,
        target: &str,
        version: Version,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        connection: ConnectionRef,
    ) -> Self {
        let (path, query) = QueryParams::split_target(target);
        let path = percent_decode_str(path).decode_utf8_lossy().into_owned();
        Request {
            method,
            path,
            query,
            version,
            headers,
            body,
            context: ContextBag::new(),
            connection,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
    }

    /// A synthetic request used when an HTTP/2 stream completes without a
    /// usable `:method`/`:path` pair (spec.md §4.4 "explicit recovery
    /// decision").
    pub fn synthetic_error(connection: ConnectionRef) -> Self {
        Request::new(Method::Get, "/error", Version::Http2, Vec::new(), Vec::new(), connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_query_out_of_path() {
        let req = Request::new(
            Method::Get,
            "/items?sort=asc",
            Version::Http11,
            vec![],
            vec![],
            ConnectionRef { slot: 0, stream_id: None },
        );
        assert_eq!(req.path, "/items");
        assert_eq!(req.query.raw("sort"), Some("asc"));
    }

    #[test]
    fn path_is_percent_decoded() {
        let req = Request::new(
            Method::Get,
            "/a%20b",
            Version::Http11,
            vec![],
            vec![],
            ConnectionRef { slot: 0, stream_id: None },
        );
        assert_eq!(req.path, "/a b");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = Request::new(
            Method::Get,
            "/",
            Version::Http11,
            vec![("Host".to_string(), "example.com".to_string())],
            vec![],
            ConnectionRef { slot: 0, stream_id: None },
        );
        assert_eq!(req.header("host"), Some("example.com"));
    }
}
