//! The HTTP serving engine core (spec.md): HPACK, the HTTP/2 connection
//! state machine, the HTTP/1.1 parser/serializer, the response streaming
//! pipeline, the connection lifecycle engine, the acceptor/reactor, the
//! worker pool, and the router contract. Continues `selenia_http`.

pub mod acceptor;
pub mod connection;
pub mod error;
pub mod hpack;
pub mod http1;
pub mod http2;
pub mod method;
pub mod query;
pub mod request;
pub mod response;
pub mod router;
pub mod runtime;
pub mod server;
