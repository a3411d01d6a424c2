//! Per-stream state (RFC 7540 §5.1), continuing
//! `selenia_http::http2::{Stream, StreamState}`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Open,
    HalfClosedRemote,
    HalfClosedLocal,
    Closed,
}

impl Default for StreamState {
    fn default() -> Self {
        StreamState::Idle
    }
}

#[derive(Debug, Default)]
pub struct Stream {
    pub id: u32,
    pub state: StreamState,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Set once a HEADERS/CONTINUATION sequence on this stream has seen
    /// END_HEADERS; until then, further CONTINUATION frames are expected.
    pub headers_ended: bool,
    /// Set once END_STREAM has been observed, regardless of which frame
    /// carried it (HEADERS or DATA).
    pub stream_ended: bool,
}

impl Stream {
    pub fn new(id: u32) -> Self {
        Stream { id, state: StreamState::Idle, ..Default::default() }
    }

    pub fn is_client_initiated(id: u32) -> bool {
        id % 2 == 1
    }
}
