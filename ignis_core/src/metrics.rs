//! Process-wide counters.
//!
//! Spec.md §1 excludes "any observability beyond counters exposed to
//! collaborators" — these three atomics are exactly that boundary, kept
//! close to the teacher's `selenia_core::metrics`.

use std::sync::atomic::{AtomicU64, Ordering};

static REQUESTS_TOTAL: AtomicU64 = AtomicU64::new(0);
static BYTES_TOTAL: AtomicU64 = AtomicU64::new(0);
static ERRORS_TOTAL: AtomicU64 = AtomicU64::new(0);

pub fn inc_requests() {
    REQUESTS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn add_bytes(n: u64) {
    BYTES_TOTAL.fetch_add(n, Ordering::Relaxed);
}

pub fn inc_errors() {
    ERRORS_TOTAL.fetch_add(1, Ordering::Relaxed);
}

pub fn snapshot() -> (u64, u64, u64) {
    (
        REQUESTS_TOTAL.load(Ordering::Relaxed),
        BYTES_TOTAL.load(Ordering::Relaxed),
        ERRORS_TOTAL.load(Ordering::Relaxed),
    )
}
