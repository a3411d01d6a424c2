#![cfg(not(target_os = "linux"))]

//! Placeholder event loop for platforms without epoll. The connection
//! lifecycle engine in `ignis_http` is specified against an edge-triggered
//! readiness model (§4.7/§4.8 of the design); porting it to kqueue/IOCP is
//! future work, not attempted here.

use super::interest::{Interest, Token};
use std::io::{Error, ErrorKind, Result};

pub struct EventLoop;

impl EventLoop {
    pub fn new() -> Result<Self> {
        Err(Error::new(ErrorKind::Unsupported, "edge-triggered event loop requires Linux epoll"))
    }

    pub fn register<T>(&mut self, _io: &T, _interest: Interest) -> Result<Token> {
        unreachable!("EventLoop::new always fails on this platform")
    }

    pub fn poll(&mut self, _timeout_ms: isize) -> Result<Vec<(Token, bool, bool)>> {
        unreachable!("EventLoop::new always fails on this platform")
    }

    pub fn deregister(&mut self, _token: Token) -> Result<()> {
        unreachable!("EventLoop::new always fails on this platform")
    }
}
