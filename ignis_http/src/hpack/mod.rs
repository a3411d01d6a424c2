//! HPACK header compression (RFC 7541), grounded on the teacher's
//! `selenia_http::hpack` module and generalized to the fuller table and
//! error semantics this engine needs.

mod decoder;
mod dynamic_table;
mod encoder;
mod huffman;
mod integer;
mod static_table;

pub use decoder::{HpackDecoder, HpackError, HpackEvent};
pub use encoder::HpackEncoder;
