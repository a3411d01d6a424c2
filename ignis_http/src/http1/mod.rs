//! HTTP/1.1 parsing and serialization (spec.md §4.5).

mod parser;
mod serializer;

pub use parser::{Http1Error, ParsedRequest, Parser};
pub use serializer::{write_body, write_head, MissingContentLength};
