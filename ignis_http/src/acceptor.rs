//! The accept loop (spec.md §4.8), grounded on
//! `selenia_http::accept::{create_reuseport_listener, spawn_accept_thread}`:
//! one kernel-level listener per configured address, `SO_REUSEPORT` so
//! several acceptor threads can share a listen queue, `TCP_NODELAY` on
//! every accepted socket, and a dedicated accept thread per listener that
//! hands sockets off through an `mpsc::channel` rather than registering
//! them with the reactor itself.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::mpsc;
use std::thread;

use tracing::{info, warn};

/// Build a listener with `SO_REUSEADDR` and `SO_REUSEPORT` set before
/// `bind`, mirroring the teacher's raw-`libc` socket setup rather than
/// `std::net`'s default (which sets neither).
pub fn create_reuseport_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let domain = if addr.is_ipv4() { libc::AF_INET } else { libc::AF_INET6 };
    // SAFETY: we only ever touch the fd through the checked libc calls
    // below, then hand it to `TcpListener::from_raw_fd` which takes
    // ownership once every setsockopt/bind/listen call has succeeded.
    unsafe {
        let fd = libc::socket(domain, libc::SOCK_STREAM, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let one: libc::c_int = 1;
        let rc = libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        if rc != 0 {
            libc::close(fd);
            return Err(io::Error::last_os_error());
        }
        let rc = libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEPORT,
            &one as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
        if rc != 0 {
            libc::close(fd);
            return Err(io::Error::last_os_error());
        }

        let rc = match addr {
            SocketAddr::V4(v4) => {
                let mut sa: libc::sockaddr_in = std::mem::zeroed();
                sa.sin_family = libc::AF_INET as libc::sa_family_t;
                sa.sin_port = v4.port().to_be();
                sa.sin_addr = libc::in_addr { s_addr: u32::from_ne_bytes(v4.ip().octets()) };
                libc::bind(
                    fd,
                    &sa as *const _ as *const libc::sockaddr,
                    std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                )
            }
            SocketAddr::V6(v6) => {
                let mut sa: libc::sockaddr_in6 = std::mem::zeroed();
                sa.sin6_family = libc::AF_INET6 as libc::sa_family_t;
                sa.sin6_port = v6.port().to_be();
                sa.sin6_addr = libc::in6_addr { s6_addr: v6.ip().octets() };
                sa.sin6_scope_id = v6.scope_id();
                libc::bind(
                    fd,
                    &sa as *const _ as *const libc::sockaddr,
                    std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t,
                )
            }
        };
        if rc != 0 {
            libc::close(fd);
            return Err(io::Error::last_os_error());
        }
        let rc = libc::listen(fd, 1024);
        if rc != 0 {
            libc::close(fd);
            return Err(io::Error::last_os_error());
        }
        Ok(std::os::unix::io::FromRawFd::from_raw_fd(fd))
    }
}

fn set_nodelay(stream: &TcpStream) -> io::Result<()> {
    let fd = stream.as_raw_fd();
    let one: libc::c_int = 1;
    // SAFETY: `fd` is a valid, open socket owned by `stream` for the
    // duration of this call.
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_NODELAY,
            &one as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// One accepted connection, handed from the accept thread to whoever owns
/// the slot table and reactor registration.
pub struct Accepted {
    pub stream: TcpStream,
    pub peer: SocketAddr,
}

/// Spawn a dedicated accept thread for `listener`. Every accepted socket
/// gets `TCP_NODELAY` and is pushed down `tx`; a failed accept is logged
/// and retried rather than tearing the thread down, since a transient
/// `EMFILE`/`ECONNABORTED` should not take the whole listener offline.
pub fn spawn_accept_thread(listener: TcpListener, tx: mpsc::Sender<Accepted>) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(err) = set_nodelay(&stream) {
                    warn!(%err, "failed to set TCP_NODELAY on accepted socket");
                }
                info!(%peer, "accepted connection");
                if tx.send(Accepted { stream, peer }).is_err() {
                    return; // receiver gone, shut this accept thread down
                }
            }
            Err(err) => {
                warn!(%err, "accept failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn reuseport_listener_accepts_a_real_connection() {
        let listener = create_reuseport_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        let _handle = spawn_accept_thread(listener, tx);

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"hi").unwrap();

        let accepted = rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap();
        assert_eq!(accepted.peer.ip(), addr.ip());
    }

    #[test]
    fn reuseport_listener_accepts_ipv6() {
        let listener = create_reuseport_listener("[::1]:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        let _handle = spawn_accept_thread(listener, tx);

        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"hi").unwrap();

        let accepted = rx.recv_timeout(std::time::Duration::from_secs(2)).unwrap();
        assert_eq!(accepted.peer.ip(), addr.ip());
    }
}
