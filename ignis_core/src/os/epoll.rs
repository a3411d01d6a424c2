use super::interest::Token;
use std::io::{Error, Result};
use std::os::unix::io::RawFd;

/// Thin, safe wrapper around a Linux epoll instance.
///
/// Every registration is edge-triggered (`EPOLLET`): the kernel signals a
/// descriptor only on a state *change*, so callers must fully drain the
/// socket on every readiness notification rather than assuming more data
/// will generate another wakeup.
#[derive(Debug)]
pub struct Epoll {
    fd: RawFd,
}

fn interest_mask(readable: bool, writable: bool) -> u32 {
    let mut mask = libc::EPOLLET as u32;
    if readable {
        mask |= libc::EPOLLIN as u32;
    }
    if writable {
        mask |= libc::EPOLLOUT as u32;
    }
    mask
}

impl Epoll {
    pub fn new() -> Result<Self> {
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(Error::last_os_error());
        }
        Ok(Epoll { fd })
    }

    pub fn add(&self, fd: RawFd, token: Token, readable: bool, writable: bool) -> Result<()> {
        let mut ev = libc::epoll_event {
            events: interest_mask(readable, writable),
            u64: token as u64,
        };
        let res = unsafe { libc::epoll_ctl(self.fd, libc::EPOLL_CTL_ADD, fd, &mut ev) };
        if res < 0 {
            return Err(Error::last_os_error());
        }
        Ok(())
    }

    pub fn modify(&self, fd: RawFd, token: Token, readable: bool, writable: bool) -> Result<()> {
        let mut ev = libc::epoll_event {
            events: interest_mask(readable, writable),
            u64: token as u64,
        };
        let res = unsafe { libc::epoll_ctl(self.fd, libc::EPOLL_CTL_MOD, fd, &mut ev) };
        if res < 0 {
            return Err(Error::last_os_error());
        }
        Ok(())
    }

    pub fn delete(&self, fd: RawFd) -> Result<()> {
        let res = unsafe { libc::epoll_ctl(self.fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if res < 0 {
            return Err(Error::last_os_error());
        }
        Ok(())
    }

    /// Wait up to `timeout_ms` (negative blocks indefinitely) and fill `events`.
    /// Returns the number of entries written.
    pub fn wait(&self, events: &mut [EpollEvent], timeout_ms: isize) -> Result<usize> {
        // Translate through a raw buffer rather than transmuting `EpollEvent`
        // directly onto `libc::epoll_event` — the two layouts are not
        // guaranteed identical across architectures.
        let mut raw: Vec<libc::epoll_event> = Vec::with_capacity(events.len());
        unsafe { raw.set_len(events.len()) };

        let n = unsafe {
            libc::epoll_wait(self.fd, raw.as_mut_ptr(), raw.len() as i32, timeout_ms as i32)
        };
        if n < 0 {
            return Err(Error::last_os_error());
        }

        for (dst, src) in events.iter_mut().zip(raw.iter().take(n as usize)) {
            let mask = src.events;
            dst.token = src.u64 as Token;
            dst.readable = mask & (libc::EPOLLIN as u32) != 0;
            dst.writable = mask & (libc::EPOLLOUT as u32) != 0;
        }
        Ok(n as usize)
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct EpollEvent {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
}

impl Default for EpollEvent {
    fn default() -> Self {
        EpollEvent { token: 0, readable: false, writable: false }
    }
}
