//! In-process transport for tests, so the connection state machine can be
//! exercised without binding a real socket. Grounded in the teacher's
//! `MemTransport`, narrowed here to a plain duplex pipe since
//! [`crate::connection::serve_connection`] only needs `AsyncRead +
//! AsyncWrite`.

use tokio::io::DuplexStream;

/// A connected pair of in-memory pipes: feed one end to
/// [`crate::connection::serve_connection`] as the "server" side, drive the
/// other end directly in the test as the "client" side.
pub fn duplex_pair(max_buf_size: usize) -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(max_buf_size)
}
