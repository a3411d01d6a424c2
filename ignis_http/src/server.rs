//! Top-level wiring: acceptor → slot table → reactor → worker pool →
//! router, replacing `selenia_http::lib::run_server`'s single-threaded
//! event loop with the slot-table/worker-pool split described in
//! spec.md §4.7-§4.9. TLS handshake mechanics stay behind
//! `ignis_core::tls::TlsStream` as a collaborator interface — this loop
//! only drives plaintext sockets, the same boundary the teacher draws
//! between `run_server` and `selenia_core::crypto::tls13`.

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, warn};

use ignis_core::config::ServerConfig;
use ignis_core::os::{Event, EventLoop, Interest, Token};

use crate::acceptor::{create_reuseport_listener, spawn_accept_thread, Accepted};
use crate::connection::{Protocol, SlotTable};
use crate::error::ConnectionError;
use crate::http1::{self, Parser as Http1Parser};
use crate::http2::{self, ConnEvent, Connection as Http2Connection};
use crate::method::Version;
use crate::request::{ConnectionRef, Request};
use crate::response::Response;
use crate::router::Router;
use crate::runtime::Runtime;

/// A registered request handler: takes the request, produces a response.
pub type Handler = Arc<dyn Fn(&mut Request) -> Response + Send + Sync>;

/// Owns every piece named in spec.md §4: the slot table, the reactor
/// registration map, the worker pool, and the router the workers
/// dispatch into.
pub struct Server {
    config: ServerConfig,
    router: Arc<Router<Handler>>,
    table: Arc<SlotTable>,
    runtime: Arc<Runtime>,
    event_loop: Mutex<EventLoop>,
    token_to_slot: Mutex<HashMap<Token, usize>>,
}

impl Server {
    pub fn new(config: ServerConfig, router: Router<Handler>) -> std::io::Result<Self> {
        let table = Arc::new(SlotTable::new(config.max_connections));
        let runtime = Arc::new(Runtime::new(config.runtime.worker_threads));
        let event_loop = EventLoop::new()?;
        Ok(Server {
            config,
            router: Arc::new(router),
            table,
            runtime,
            event_loop: Mutex::new(event_loop),
            token_to_slot: Mutex::new(HashMap::new()),
        })
    }

    /// Bind, accept, and serve forever. Returns only on a fatal setup
    /// error (bind failure); per-connection errors are logged and
    /// dispose of only that connection's slot.
    pub fn run(&self) -> std::io::Result<()> {
        let addr = std::net::SocketAddr::new(self.config.ip, self.config.port);
        let listener = create_reuseport_listener(addr)?;
        let (tx, rx) = mpsc::channel::<Accepted>();
        let _accept_thread = spawn_accept_thread(listener, tx);
        let keep_alive = self.config.keep_alive();

        loop {
            while let Ok(accepted) = rx.try_recv() {
                self.register_connection(accepted, keep_alive);
            }

            let events = {
                let mut event_loop = self.event_loop.lock().unwrap();
                event_loop.poll(200)?
            };
            for (token, readable, _writable) in events {
                self.dispatch_readable(token, readable);
            }
        }
    }

    fn register_connection(&self, accepted: Accepted, keep_alive: Duration) {
        if let Err(err) = accepted.stream.set_nonblocking(true) {
            warn!(%err, "failed to set socket non-blocking");
            return;
        }
        let peer = accepted.peer;
        match self.table.acquire(accepted.stream, peer, keep_alive) {
            Ok(index) => {
                let registered = self.table.with_inner(index, |_peer, _proto, _buf, socket| {
                    let socket_ref = socket.as_ref().expect("freshly acquired slot always has a socket");
                    self.event_loop.lock().unwrap().register(socket_ref, Interest::Readable)
                });
                match registered {
                    Some(Ok(token)) => {
                        self.token_to_slot.lock().unwrap().insert(token, index);
                        let table = Arc::clone(&self.table);
                        std::thread::spawn(move || table.run_sentinel(index));
                        // The acceptor's own reference is released once the
                        // connection is parked waiting on readability; a
                        // worker re-`take`s it for each readiness event.
                        self.table.release(index);
                    }
                    _ => {
                        warn!(%peer, "failed to register accepted connection with the reactor");
                        self.table.mark_closed(index);
                    }
                }
            }
            Err(err) => {
                warn!(%peer, %err, "connection slot table is full, dropping connection");
            }
        }
    }

    fn dispatch_readable(&self, token: Token, readable: bool) {
        if !readable {
            return;
        }
        let index = match self.token_to_slot.lock().unwrap().get(&token).copied() {
            Some(index) => index,
            None => return,
        };
        if self.table.take(index).is_err() {
            return; // stale event on a slot that is already gone
        }

        let table = Arc::clone(&self.table);
        let router = Arc::clone(&self.router);
        let runtime = Arc::clone(&self.runtime);
        self.runtime.spawn(Box::new(move || {
            table.was_active(index);
            if let Err(err) = service_slot(&table, &router, &runtime, index) {
                debug!(index, %err, "closing connection after error");
                ignis_core::metrics::inc_errors();
                table.mark_closed(index);
            }
            table.release(index);
        }));
    }
}

#[derive(Debug, thiserror::Error)]
enum ServiceError {
    #[error("peer closed the connection")]
    Eof,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Read whatever is available on the slot's socket, feed it to the right
/// protocol state machine, and answer every request it yields with the
/// router's matching handler (or `not_found`).
///
/// The reactor is registered edge-triggered (`ignis_core::os::epoll`
/// always sets `EPOLLET`), so a single readiness notification is the only
/// signal this connection will ever get until it blocks again: any bytes
/// left unread in the kernel socket buffer after this call returns will
/// never trigger another event on their own. The read loop below keeps
/// calling `read` until it sees `WouldBlock` (or EOF/error) rather than
/// reading once per notification, per spec.md §5 and the glossary's
/// "edge-triggered readiness" entry ("consumers must fully drain sockets").
fn service_slot(table: &Arc<SlotTable>, router: &Arc<Router<Handler>>, runtime: &Arc<Runtime>, index: usize) -> Result<(), ServiceError> {
    let connection_ref = ConnectionRef { slot: index, stream_id: None };
    let mut scratch = [0u8; 32 * 1024];

    let outcome = table.with_inner(index, |_peer, protocol, buf, socket| -> Result<Vec<u8>, ServiceError> {
        let socket_ref = socket.as_mut().ok_or(ServiceError::Eof)?;
        let mut read_any = false;
        loop {
            match socket_ref.read(&mut scratch) {
                Ok(0) => return Err(ServiceError::Eof),
                Ok(n) => {
                    read_any = true;
                    buf.extend_from_slice(&scratch[..n]);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => return Err(ServiceError::Io(err)),
            }
        }
        if !read_any {
            return Ok(Vec::new());
        }

        if protocol.is_none() {
            *protocol = Some(if http2::frame::is_preface(buf) { Protocol::Http2(Box::new(Http2Connection::new(index))) } else { Protocol::Http1(Http1Parser) });
        }
        match protocol.as_mut().unwrap() {
            Protocol::Http1(_) => drive_http1(buf, router, runtime, connection_ref, table, index),
            Protocol::Http2(conn) => {
                drive_http2(conn, buf, router, runtime, table, index)?;
                Ok(conn.take_outbound())
            }
        }
    });

    let pending_write = match outcome {
        Some(result) => result?,
        None => return Err(ServiceError::Eof),
    };

    // Flush whatever the protocol handler queued for the peer: serialized
    // HTTP/1.1 responses or HTTP/2 response/control frames.
    table.with_inner(index, |_peer, _protocol, _buf, socket| -> Result<(), ServiceError> {
        let socket = socket.as_mut().ok_or(ServiceError::Eof)?;
        if !pending_write.is_empty() {
            socket.write_all(&pending_write)?;
        }
        Ok(())
    }).unwrap_or(Ok(()))
}

/// Drain every complete HTTP/1.1 request currently buffered, answering each
/// in order and appending its serialized response to the returned buffer.
/// A request with `Connection: close` (or a parse error) tombstones the
/// slot via `table.mark_closed` once its response has been appended, per
/// spec.md §9's resolved Open Question.
fn drive_http1(
    buf: &mut Vec<u8>,
    router: &Arc<Router<Handler>>,
    runtime: &Arc<Runtime>,
    connection_ref: ConnectionRef,
    table: &Arc<SlotTable>,
    index: usize,
) -> Result<Vec<u8>, ServiceError> {
    let mut parser = http1::Parser;
    let mut out = Vec::new();
    loop {
        match parser.parse(buf) {
            Ok(Some((parsed, consumed))) => {
                let headers: Vec<(String, String)> = parsed.headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
                let request = Request::new(
                    parsed.method,
                    parsed.target,
                    parsed.version,
                    headers,
                    parsed.body.to_vec(),
                    connection_ref,
                );
                buf.drain(..consumed);
                let close_after = !keeps_alive(&request);
                match answer_request(router, runtime, table, index, AsyncTarget::Http1, request) {
                    Some(mut response) => {
                        if http1::write_head(&mut out, &response).is_ok() {
                            http1::write_body(&mut out, &mut response);
                        } else {
                            error!("response is missing Content-Length; closing connection");
                            table.mark_closed(index);
                            return Ok(out);
                        }
                        if close_after {
                            table.mark_closed(index);
                            return Ok(out);
                        }
                    }
                    // Dispatched to a detached thread (spec.md §4.9
                    // `asynchronous` escape hatch); it writes its own
                    // response and applies `close_after` once the handler
                    // returns. Keep draining any further pipelined
                    // requests already buffered on this connection.
                    None => {}
                }
            }
            Ok(None) => return Ok(out),
            Err(err) => {
                error!(%err, "http/1.1 parse error");
                buf.clear();
                let mut response = Response::once(400, vec![("Content-Length".to_string(), "0".to_string())], Vec::new());
                if http1::write_head(&mut out, &response).is_ok() {
                    http1::write_body(&mut out, &mut response);
                }
                table.mark_closed(index);
                return Ok(out);
            }
        }
    }
}

fn drive_http2(
    conn: &mut Http2Connection,
    buf: &mut Vec<u8>,
    router: &Arc<Router<Handler>>,
    runtime: &Arc<Runtime>,
    table: &Arc<SlotTable>,
    index: usize,
) -> Result<(), ServiceError> {
    conn.feed(buf);
    buf.clear();
    loop {
        match conn.poll() {
            ConnEvent::NeedMore => return Ok(()),
            ConnEvent::SettingsProcessed => continue,
            ConnEvent::NewRequest(request) => {
                let stream_id = request.connection.stream_id.unwrap_or(0);
                match answer_request(router, runtime, table, index, AsyncTarget::Http2 { stream_id }, request) {
                    Some(mut response) => conn.encode_response(stream_id, &mut response),
                    // As above: a detached thread owns encoding and
                    // writing this stream's response.
                    None => {}
                }
            }
            ConnEvent::Invalid(err) => return Err(err.into()),
            ConnEvent::Eof => return Ok(()),
        }
    }
}

/// Where an `asynchronous`-dispatched response gets serialized once its
/// detached handler returns (spec.md §4.9).
enum AsyncTarget {
    Http1,
    Http2 { stream_id: u32 },
}

/// Resolve `request` against the router and either run the handler inline
/// (the ordinary, pooled-worker path — `Some(response)` for the caller to
/// serialize and write) or, for an `asynchronous`-marked endpoint, hand it
/// to a fresh thread that bypasses the bounded pool entirely and returns
/// `None` (the caller has nothing left to do for this request).
fn answer_request(
    router: &Arc<Router<Handler>>,
    runtime: &Arc<Runtime>,
    table: &Arc<SlotTable>,
    index: usize,
    target: AsyncTarget,
    mut request: Request,
) -> Option<Response> {
    ignis_core::metrics::inc_requests();
    ignis_core::metrics::add_bytes(request.body.len() as u64);
    match router.find(request.method, &request.path) {
        Some((handler, binding, asynchronous)) => {
            request.context.insert(binding);
            if asynchronous {
                dispatch_async(Arc::clone(table), Arc::clone(runtime), index, target, Arc::clone(handler), request);
                None
            } else {
                Some(handler(&mut request))
            }
        }
        None => Some(router.not_found(&request)),
    }
}

/// The `asynchronous` endpoint escape hatch (spec.md §4.9/§6): run the
/// handler on a thread of its own via [`Runtime::spawn_detached`], then
/// serialize and write its response directly to the connection's socket
/// once it returns, instead of blocking the bounded worker-pool thread
/// that read this request off the wire.
///
/// Per spec.md §4.7 ("Long-running handlers ... do `take()` before the
/// handler closure begins and `release()` when `finish` fires"), an extra
/// slot reference is held for the handler's lifetime so the sentinel
/// cannot tear the connection down while it is still running.
fn dispatch_async(table: Arc<SlotTable>, runtime: Arc<Runtime>, index: usize, target: AsyncTarget, handler: Handler, mut request: Request) {
    if table.take(index).is_err() {
        return; // slot already gone; nothing to respond on
    }
    runtime.spawn_detached(Box::new(move || {
        let mut response = handler(&mut request);
        let close_after = matches!(target, AsyncTarget::Http1) && !keeps_alive(&request);

        let written = table.with_inner(index, |_peer, protocol, _buf, socket| -> std::io::Result<()> {
            let mut out = Vec::new();
            match target {
                AsyncTarget::Http1 => {
                    if http1::write_head(&mut out, &response).is_ok() {
                        http1::write_body(&mut out, &mut response);
                    } else {
                        error!("async response is missing Content-Length; closing connection");
                    }
                }
                AsyncTarget::Http2 { stream_id } => {
                    if let Some(Protocol::Http2(conn)) = protocol {
                        conn.encode_response(stream_id, &mut response);
                        out.extend(conn.take_outbound());
                    }
                }
            }
            let socket = socket.as_mut().ok_or_else(|| std::io::Error::from(ErrorKind::NotConnected))?;
            if !out.is_empty() {
                socket.write_all(&out)?;
            }
            Ok(())
        });

        if !matches!(written, Some(Ok(()))) {
            debug!(index, "async handler could not write its response; closing connection");
            table.mark_closed(index);
        } else if close_after {
            table.mark_closed(index);
        }
        table.release(index);
    }));
}

fn keeps_alive(request: &Request) -> bool {
    match request.header("connection") {
        Some(v) if v.eq_ignore_ascii_case("close") => false,
        _ => !matches!(request.version, Version::Http10),
    }
}
