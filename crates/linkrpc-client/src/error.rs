use std::io;

use thiserror::Error;

/// Client-observable error kinds, per `spec.md` §7.
#[derive(Debug, Error, Clone)]
pub enum ClientError {
    #[error("failed to resolve {0}")]
    ResolveError(String),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("request timed out")]
    RequestTimeout,

    #[error("write error: {0}")]
    WriteError(String),

    #[error("read error: {0}")]
    ReadError(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("socket closed")]
    SocketClosed,

    /// An application-level `FAIL` response: `unknown function`, a bad
    /// argument, or the handler's own error text.
    #[error("{0}")]
    RemoteFailure(String),
}

impl ClientError {
    /// Whether this is a transport-level failure (as opposed to an
    /// application `FAIL` response, which isn't a client error at all — it
    /// surfaces as `Err(ClientError::RemoteFailure)` from `call`/`async_call`
    /// but doesn't touch connection state).
    pub fn is_transient(&self) -> bool {
        !matches!(self, ClientError::ProtocolError(_) | ClientError::RemoteFailure(_))
    }
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ClientError::SocketClosed
        } else {
            ClientError::ReadError(e.to_string())
        }
    }
}
