//! The HTTP/2 connection state machine (RFC 7540), continuing
//! `selenia_http::http2`.

pub mod connection;
pub mod frame;
mod settings;
mod stream;

pub use connection::{ConnEvent, Connection};
pub use stream::{Stream, StreamState};
