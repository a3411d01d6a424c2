//! The TLS collaborator interface (spec.md §6).
//!
//! TLS handshake mechanics are explicitly out of scope for this engine: the
//! core only needs something that reads and writes bytes and can report the
//! ALPN protocol the handshake settled on. `h2` selects HTTP/2; anything
//! else (or no ALPN at all) falls back to HTTP/1.x.

use std::io::{Read, Write};

pub const ALPN_H2: &[u8] = b"h2";

/// An ALPN-capable TLS stream as the core consumes it.
pub trait TlsStream: Read + Write {
    /// The protocol identifier negotiated during the handshake, if any.
    fn negotiated_alpn(&self) -> Option<&[u8]>;
}

#[cfg(feature = "tls")]
pub mod rustls_adapter {
    //! A concrete [`TlsStream`] backed by the real `rustls` crate. This is
    //! the engine's one opinion about how to actually do TLS; the core
    //! itself only depends on the trait above.

    use super::TlsStream;
    use rustls::ServerConnection;
    use std::io::{self, Read, Write};
    use std::net::TcpStream;

    pub struct RustlsStream {
        conn: ServerConnection,
        sock: TcpStream,
    }

    impl RustlsStream {
        pub fn new(conn: ServerConnection, sock: TcpStream) -> Self {
            Self { conn, sock }
        }
    }

    impl Read for RustlsStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut stream = self.conn.complete_io(&mut self.sock).map(|_| ())?;
            let _ = &mut stream;
            self.conn.reader().read(buf)
        }
    }

    impl Write for RustlsStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = self.conn.writer().write(buf)?;
            self.conn.complete_io(&mut self.sock)?;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.conn.writer().flush()?;
            self.conn.complete_io(&mut self.sock)?;
            Ok(())
        }
    }

    impl TlsStream for RustlsStream {
        fn negotiated_alpn(&self) -> Option<&[u8]> {
            self.conn.alpn_protocol()
        }
    }
}
