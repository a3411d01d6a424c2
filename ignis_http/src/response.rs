//! The response model and its chunk channel (spec.md §3/§4.6).
//!
//! No direct teacher analogue exists — the teacher formats responses
//! inline in `handle_request` — so the HTTP/1.1 half of the wire format
//! is grounded on that inline `format!("{} {}\r\n...")` style, and the
//! event-callback/channel data model is grounded on
//! `original_source/include/http/response.hpp`'s `on("chunk", ...)` /
//! `on("finish", ...)` callbacks, restated as an `std::sync::mpsc`
//! single-producer/single-consumer channel.

use std::sync::mpsc;

use ignis_core::context::ContextBag;

/// One owned buffer handed from producer to consumer; `last` marks the
/// end of the body.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub data: Vec<u8>,
    pub last: bool,
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("response body channel's consumer has gone away")]
pub struct ChunkSendError;

/// The producer half, held by the handler (or a thread it spawns for an
/// `asynchronous` endpoint) to stream bytes lazily.
pub struct BodyWriter {
    tx: mpsc::SyncSender<Chunk>,
}

impl BodyWriter {
    pub fn send(&self, data: Vec<u8>, last: bool) -> Result<(), ChunkSendError> {
        self.tx.send(Chunk { data, last }).map_err(|_| ChunkSendError)
    }
}

/// The consumer half, held by the protocol serializer. Guarantees at
/// most one outstanding chunk: each `next_chunk` call fires the `chunk`
/// callbacks, then blocks for the next buffer.
struct BodyReader {
    rx: mpsc::Receiver<Chunk>,
    chunk_callbacks: Vec<Box<dyn FnMut() + Send>>,
    finish_callbacks: Vec<Box<dyn FnMut() + Send>>,
    finished: bool,
}

impl BodyReader {
    fn next_chunk(&mut self) -> Option<Chunk> {
        if self.finished {
            return None;
        }
        for cb in &mut self.chunk_callbacks {
            cb();
        }
        match self.rx.recv() {
            Ok(chunk) => {
                if chunk.last {
                    self.mark_finished();
                }
                Some(chunk)
            }
            Err(_) => {
                // Producer dropped without sending `last`; still exactly one
                // `finish` fires (testable property #6).
                self.mark_finished();
                None
            }
        }
    }

    fn mark_finished(&mut self) {
        if !self.finished {
            self.finished = true;
            for cb in &mut self.finish_callbacks {
                cb();
            }
        }
    }
}

pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub context: ContextBag,
    body: BodyReader,
}

impl Response {
    /// Build a response and its paired producer handle.
    pub fn new(status: u16) -> (Response, BodyWriter) {
        let (tx, rx) = mpsc::sync_channel(1);
        let response = Response {
            status,
            headers: Vec::new(),
            context: ContextBag::new(),
            body: BodyReader { rx, chunk_callbacks: Vec::new(), finish_callbacks: Vec::new(), finished: false },
        };
        (response, BodyWriter { tx })
    }

    /// Convenience constructor for handlers that already have the whole
    /// body in hand (the common case): writes the sole, `last=true` chunk
    /// synchronously before returning.
    pub fn once(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Response {
        let (mut response, writer) = Response::new(status);
        response.headers = headers;
        let _ = writer.send(body, true);
        response
    }

    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn content_length(&self) -> Option<usize> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.parse().ok())
    }

    /// Register a callback invoked just before each chunk pull — the hook
    /// handlers use to lazily produce bytes under backpressure.
    pub fn on_chunk(&mut self, cb: impl FnMut() + Send + 'static) {
        self.body.chunk_callbacks.push(Box::new(cb));
    }

    /// Register a callback invoked exactly once, when the body is fully
    /// drained — where handler-owned resources get released.
    pub fn on_finish(&mut self, cb: impl FnMut() + Send + 'static) {
        self.body.finish_callbacks.push(Box::new(cb));
    }

    /// Drain the next chunk, driving the `chunk`/`finish` callbacks.
    pub fn next_chunk(&mut self) -> Option<Chunk> {
        self.body.next_chunk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn chunks_are_observed_in_order_and_finish_fires_once() {
        let (mut response, writer) = Response::new(200);
        let finish_count = Arc::new(AtomicUsize::new(0));
        let fc = finish_count.clone();
        response.on_finish(move || {
            fc.fetch_add(1, Ordering::SeqCst);
        });

        std::thread::spawn(move || {
            writer.send(b"hello ".to_vec(), false).unwrap();
            writer.send(b"world".to_vec(), true).unwrap();
        });

        let mut seen = Vec::new();
        while let Some(chunk) = response.next_chunk() {
            let is_last = chunk.last;
            seen.push(chunk.data);
            if is_last {
                break;
            }
        }
        assert_eq!(seen, vec![b"hello ".to_vec(), b"world".to_vec()]);
        assert_eq!(response.next_chunk().map(|c| c.data), None);
        assert_eq!(finish_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn once_constructor_produces_a_single_last_chunk() {
        let mut response = Response::once(200, vec![("content-length".to_string(), "2".to_string())], b"hi".to_vec());
        assert_eq!(response.content_length(), Some(2));
        let chunk = response.next_chunk().unwrap();
        assert_eq!(chunk.data, b"hi");
        assert!(chunk.last);
        assert!(response.next_chunk().is_none());
    }
}
