//! The error taxonomy (spec.md §7), continuing `selenia_http::error::ErrorKind`
//! generalized from a flat enum into per-subsystem `thiserror` types plus a
//! connection-level classification of what each one means for the wire.

use crate::hpack::HpackError;
use crate::http1::Http1Error;
use crate::http2::frame::FrameCodecError;

/// How a failure should be handled by the connection driving the protocol
/// state machine (spec.md §7's recoverable/fatal split).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Reply with the given status and close the connection (HTTP/1.1) or
    /// continue but drop the offending unit of work (unknown frame types).
    Recoverable,
    /// The connection cannot continue; terminate it.
    Fatal,
    /// Reset only the offending stream; the connection continues.
    ResetStream,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("HTTP/1.1 parse error: {0}")]
    Http1(#[from] Http1Error),
    #[error("HPACK error: {0}")]
    Hpack(#[from] HpackError),
    #[error("frame codec error: {0}")]
    Frame(#[from] FrameCodecError),
    #[error("bad HTTP/2 client preface")]
    BadPreface,
    #[error("SETTINGS frame length {0} is not a multiple of 6")]
    BadSettingsLength(u32),
    #[error("expected a SETTINGS frame on stream 0 to open the connection")]
    ExpectedSettingsFrame,
    #[error("DATA frame on unknown stream {0}")]
    DataOnUnknownStream(u32),
    #[error("CONTINUATION frame does not match the pending HEADERS stream")]
    ContinuationStreamMismatch,
    #[error("slot table is full")]
    SlotTableFull,
    #[error("handler panicked or returned an application error")]
    HandlerFailed,
}

impl ConnectionError {
    pub fn disposition(&self) -> Disposition {
        match self {
            ConnectionError::Http1(_) => Disposition::Recoverable,
            ConnectionError::Hpack(_) => Disposition::Fatal,
            ConnectionError::Frame(FrameCodecError::TooBig(_)) => Disposition::Fatal,
            ConnectionError::Frame(FrameCodecError::Invalid) => Disposition::Fatal,
            ConnectionError::BadPreface => Disposition::Fatal,
            ConnectionError::BadSettingsLength(_) => Disposition::Fatal,
            ConnectionError::ExpectedSettingsFrame => Disposition::Fatal,
            ConnectionError::DataOnUnknownStream(_) => Disposition::Fatal,
            // A CONTINUATION naming the wrong stream leaves the HPACK
            // decoder's header-block buffer in an indeterminate state that
            // is shared across every stream on the connection, so this is
            // connection-fatal rather than a single stream's problem.
            ConnectionError::ContinuationStreamMismatch => Disposition::Fatal,
            ConnectionError::SlotTableFull => Disposition::Recoverable,
            ConnectionError::HandlerFailed => Disposition::Recoverable,
        }
    }

    /// Status code to report for `Recoverable` HTTP/1.1 dispositions.
    pub fn status_code(&self) -> u16 {
        match self {
            ConnectionError::Http1(_) => 400,
            ConnectionError::SlotTableFull => 503,
            ConnectionError::HandlerFailed => 500,
            _ => 400,
        }
    }
}
