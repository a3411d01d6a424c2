//! Edge-triggered I/O readiness abstraction.
//!
//! Linux is the only fully implemented backend (epoll, `EPOLLET`); other
//! platforms get a stub that fails at construction rather than silently
//! degrading to a level-triggered model the rest of the engine does not
//! expect.

#[cfg(target_os = "linux")]
mod epoll;
#[cfg(target_os = "linux")]
mod event_loop;
#[cfg(not(target_os = "linux"))]
mod event_loop_stub;

mod interest;

#[cfg(target_os = "linux")]
pub use epoll::{Epoll, EpollEvent};
#[cfg(target_os = "linux")]
pub use event_loop::EventLoop;
#[cfg(not(target_os = "linux"))]
pub use event_loop_stub::EventLoop;

pub use interest::{Event, Interest, Token};
