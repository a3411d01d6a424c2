#![cfg(target_os = "linux")]

use super::epoll::{Epoll, EpollEvent};
use super::interest::{Interest, Token};
use std::collections::HashMap;
use std::io::Result;
use std::os::unix::io::{AsRawFd, RawFd};

struct Registration {
    fd: RawFd,
}

/// Edge-triggered readiness loop over epoll.
///
/// Callers drive the loop themselves: [`poll`](Self::poll) blocks up to a
/// timeout and returns every token that became ready in this wakeup. Tokens
/// are opaque `usize`s assigned at registration time — the loop never hands
/// back a pointer, so a caller that keeps its own slot table keyed by token
/// can safely ignore events for slots it has already torn down.
pub struct EventLoop {
    ep: Epoll,
    registrations: HashMap<Token, Registration>,
    next_token: Token,
    scratch: Vec<EpollEvent>,
}

impl EventLoop {
    pub fn new() -> Result<Self> {
        Ok(EventLoop {
            ep: Epoll::new()?,
            registrations: HashMap::new(),
            next_token: 1, // 0 is reserved for "no token"
            scratch: vec![EpollEvent::default(); 1024],
        })
    }

    /// Register `io` for `interest`, returning the token that will appear in
    /// future [`poll`](Self::poll) results for this descriptor.
    pub fn register<T: AsRawFd>(&mut self, io: &T, interest: Interest) -> Result<Token> {
        let fd = io.as_raw_fd();
        let token = self.next_token;
        self.next_token += 1;
        let (r, w) = match interest {
            Interest::Readable => (true, false),
            Interest::Writable => (false, true),
            Interest::ReadWrite => (true, true),
        };
        self.ep.add(fd, token, r, w)?;
        self.registrations.insert(token, Registration { fd });
        Ok(token)
    }

    /// Wait for readiness; negative `timeout_ms` blocks indefinitely.
    pub fn poll(&mut self, timeout_ms: isize) -> Result<Vec<(Token, bool, bool)>> {
        let n = self.ep.wait(&mut self.scratch, timeout_ms)?;
        Ok(self.scratch.iter().take(n).map(|e| (e.token, e.readable, e.writable)).collect())
    }

    pub fn deregister(&mut self, token: Token) -> Result<()> {
        if let Some(reg) = self.registrations.remove(&token) {
            self.ep.delete(reg.fd)?;
        }
        Ok(())
    }
}
