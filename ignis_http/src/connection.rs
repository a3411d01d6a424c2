//! The connection lifetime engine (spec.md §4.7), grounded directly on
//! `original_source/include/connection.hpp` (`take()`/`release()`/
//! `was_active()`/`idle()`/the condition-variable sentinel wait) and
//! restated, per spec.md §9's explicit redesign instruction, as a
//! `Vec<SlotEntry>` fixed-capacity table indexed by `usize`, never a
//! pointer — continuing the teacher's token-keyed `HashMap<usize, Conn>`
//! in `selenia_http::lib::run_server` but replacing the unbounded
//! `HashMap` (no slot reuse, no tombstone) with this fixed-size table.

use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, instrument};

use crate::http1::Parser as Http1Parser;
use crate::http2::Connection as Http2Connection;

/// Which protocol state machine a slot is driving. Decided on first bytes
/// (HTTP/2 client preface vs. anything else), or from ALPN if the
/// connection arrived over TLS.
pub enum Protocol {
    Http1(Http1Parser),
    Http2(Box<Http2Connection>),
}

struct SlotInner {
    socket: Option<TcpStream>,
    peer: SocketAddr,
    protocol: Option<Protocol>,
    buf: Vec<u8>,
}

struct Activity {
    last_active: Instant,
    keep_alive: Duration,
    closed: bool,
}

struct SlotEntry {
    /// `true` means this slot is free. Checked with a plain atomic load so
    /// a stale readiness event never has to take the mutex, let alone
    /// dereference anything, to be recognized as stale (spec.md §4.7,
    /// §9 "pointer tagging removed").
    tombstone: AtomicBool,
    refcount: AtomicUsize,
    inner: Mutex<Option<SlotInner>>,
    activity: Mutex<Activity>,
    sentinel: Condvar,
}

impl SlotEntry {
    fn empty() -> Self {
        SlotEntry {
            tombstone: AtomicBool::new(true),
            refcount: AtomicUsize::new(0),
            inner: Mutex::new(None),
            activity: Mutex::new(Activity { last_active: Instant::now(), keep_alive: Duration::from_secs(5), closed: false }),
            sentinel: Condvar::new(),
        }
    }
}

/// The fixed-capacity slot table (spec.md §3 "Connection slot", §4.7).
pub struct SlotTable {
    slots: Vec<SlotEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("slot table is at capacity")]
    Full,
    #[error("slot was tombstoned before this operation observed it")]
    Stale,
}

impl SlotTable {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, SlotEntry::empty);
        SlotTable { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Populate the first free slot with a newly accepted socket. The
    /// acceptor holds the refcount-1 reference on the returned index until
    /// it hands the slot off to the runtime.
    #[instrument(skip(self, socket))]
    pub fn acquire(&self, socket: TcpStream, peer: SocketAddr, keep_alive: Duration) -> Result<usize, SlotError> {
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.tombstone.compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire).is_ok() {
                *slot.inner.lock().unwrap() = Some(SlotInner { socket: Some(socket), peer, protocol: None, buf: Vec::new() });
                *slot.activity.lock().unwrap() = Activity { last_active: Instant::now(), keep_alive, closed: false };
                slot.refcount.store(1, Ordering::Release);
                debug!(index, "slot acquired");
                return Ok(index);
            }
        }
        Err(SlotError::Full)
    }

    /// Raise the refcount for a dispatch to a worker. Returns `Err(Stale)`
    /// if the slot is tombstoned (a late readiness event), in which case
    /// the caller must not touch the slot any further.
    pub fn take(&self, index: usize) -> Result<(), SlotError> {
        let slot = &self.slots[index];
        if slot.tombstone.load(Ordering::Acquire) {
            return Err(SlotError::Stale);
        }
        slot.refcount.fetch_add(1, Ordering::AcqRel);
        if slot.tombstone.load(Ordering::Acquire) {
            self.release(index);
            return Err(SlotError::Stale);
        }
        Ok(())
    }

    /// Drop a reference acquired by `take`/`acquire`; wakes the sentinel
    /// so it can re-check its free condition.
    pub fn release(&self, index: usize) {
        let slot = &self.slots[index];
        slot.refcount.fetch_sub(1, Ordering::AcqRel);
        self.slots[index].sentinel.notify_all();
    }

    pub fn was_active(&self, index: usize) {
        let slot = &self.slots[index];
        let mut activity = slot.activity.lock().unwrap();
        activity.last_active = Instant::now();
        slot.sentinel.notify_all();
    }

    pub fn mark_closed(&self, index: usize) {
        let slot = &self.slots[index];
        slot.activity.lock().unwrap().closed = true;
        slot.sentinel.notify_all();
    }

    pub fn is_tombstoned(&self, index: usize) -> bool {
        self.slots[index].tombstone.load(Ordering::Acquire)
    }

    /// Run `f` against the slot's serialized socket/protocol state. Reads
    /// and writes on one connection always go through here, so they are
    /// naturally serialized by the mutex (spec.md §4.7 "serialized
    /// writes").
    pub fn with_inner<R>(&self, index: usize, f: impl FnOnce(&mut SocketAddr, &mut Option<Protocol>, &mut Vec<u8>, &mut Option<TcpStream>) -> R) -> Option<R> {
        if self.is_tombstoned(index) {
            return None;
        }
        let mut guard = self.slots[index].inner.lock().unwrap();
        let inner = guard.as_mut()?;
        Some(f(&mut inner.peer, &mut inner.protocol, &mut inner.buf, &mut inner.socket))
    }

    /// The sentinel's loop body for one live slot: wait until the
    /// keep-alive deadline, then check `(idle AND refcount==0) OR closed`;
    /// free the slot if satisfied, otherwise recompute and wait again.
    /// Runs until the slot is tombstoned.
    #[instrument(skip(self))]
    pub fn run_sentinel(&self, index: usize) {
        loop {
            let slot = &self.slots[index];
            let activity = slot.activity.lock().unwrap();
            let deadline = activity.last_active + activity.keep_alive;
            let now = Instant::now();
            let wait_for = deadline.saturating_duration_since(now);
            let (activity, timed_out) =
                self.slots[index].sentinel.wait_timeout(activity, wait_for).unwrap();
            let idle_expired = Instant::now() >= activity.last_active + activity.keep_alive;
            let closed = activity.closed;
            let refcount_zero = slot.refcount.load(Ordering::Acquire) == 0;
            drop(activity);

            if closed || (refcount_zero && idle_expired) {
                self.free(index);
                debug!(index, timed_out = timed_out.timed_out(), "slot freed by sentinel");
                return;
            }
        }
    }

    fn free(&self, index: usize) {
        let slot = &self.slots[index];
        let mut inner = slot.inner.lock().unwrap();
        if let Some(mut inner) = inner.take() {
            if let Some(socket) = inner.socket.take() {
                let _ = socket.shutdown(std::net::Shutdown::Both);
            }
        }
        slot.tombstone.store(true, Ordering::Release);
        slot.refcount.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    fn loopback_pair() -> (TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, peer) = listener.accept().unwrap();
        drop(client);
        (server, peer)
    }

    #[test]
    fn acquire_take_release_tracks_refcount() {
        let table = SlotTable::new(4);
        let (sock, peer) = loopback_pair();
        let idx = table.acquire(sock, peer, Duration::from_secs(5)).unwrap();
        assert!(!table.is_tombstoned(idx));
        table.take(idx).unwrap();
        table.release(idx);
        table.release(idx); // drop the acceptor's own reference
    }

    #[test]
    fn full_table_rejects_new_connections() {
        let table = SlotTable::new(1);
        let (sock1, peer1) = loopback_pair();
        table.acquire(sock1, peer1, Duration::from_secs(5)).unwrap();
        let (sock2, peer2) = loopback_pair();
        assert_eq!(table.acquire(sock2, peer2, Duration::from_secs(5)), Err(SlotError::Full));
    }

    #[test]
    fn take_on_tombstoned_slot_is_stale() {
        let table = SlotTable::new(2);
        assert_eq!(table.take(0), Err(SlotError::Stale));
    }

    #[test]
    fn sentinel_frees_idle_slot_and_tombstones_it() {
        let table = SlotTable::new(2);
        let (sock, peer) = loopback_pair();
        let idx = table.acquire(sock, peer, Duration::from_millis(50)).unwrap();
        table.release(idx); // drop acceptor's reference so refcount hits 0
        table.run_sentinel(idx);
        assert!(table.is_tombstoned(idx));
    }
}
