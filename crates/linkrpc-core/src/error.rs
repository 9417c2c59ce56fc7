use std::io;

use linkrpc_wire::HeaderError;
use thiserror::Error;

/// Errors that can end a connection's read loop, per `spec.md` §7's error
/// kind table (the subset observable from the connection state machine
/// itself; client-only kinds like `ConnectTimeout` live in `linkrpc-client`).
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("read error: {0}")]
    ReadError(#[source] io::Error),

    #[error("write error: {0}")]
    WriteError(#[source] io::Error),

    #[error("protocol error: {0}")]
    ProtocolError(#[from] HeaderError),

    #[error("idle timeout")]
    IdleTimeout,

    #[error("connection closed")]
    SocketClosed,
}

impl ConnectionError {
    /// Whether this error leaves room for a retry (as opposed to a fatal
    /// framing violation that must never be retried against the same peer
    /// without renegotiating the protocol).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectionError::ReadError(_)
                | ConnectionError::WriteError(_)
                | ConnectionError::IdleTimeout
                | ConnectionError::SocketClosed
        )
    }
}
