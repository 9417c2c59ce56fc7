use std::sync::Arc;
use std::time::Duration;

use linkrpc_registry::Router;
use linkrpc_wire::{encode_publish, encode_response, Codec, Header, ReqType, HEADER_LEN};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::ConnectionError;
use crate::handle::{ConnectionHandle, OutboundFrame};
use crate::pubsub::SubscriptionRegistry;

/// Knobs governing one connection's read loop. `Duration::ZERO` disables the
/// corresponding timer, matching `spec.md` §6's "0 disables" convention.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    pub idle_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(15),
        }
    }
}

/// Drive one connection's `AwaitingHeader -> AwaitingBody -> Dispatching ->
/// Writing -> AwaitingHeader` loop to completion, returning why it stopped.
///
/// Generic over any `AsyncRead + AsyncWrite` so the same state machine
/// drives a real `TcpStream` (the server) and an in-memory duplex pipe
/// (tests, via [`crate::testing`]).
///
/// `on_connected` fires as soon as the [`ConnectionHandle`] exists, before
/// the first byte is read — the caller (typically the server's accept loop)
/// uses it to insert the handle into its connection map without waiting for
/// the connection to finish.
pub async fn serve_connection<S>(
    id: u64,
    stream: S,
    router: Arc<Router>,
    subscriptions: Arc<SubscriptionRegistry>,
    config: ConnectionConfig,
    on_connected: impl FnOnce(Arc<ConnectionHandle>),
) -> ConnectionError
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = Arc::new(ConnectionHandle::new(id, tx));
    // Detached: per the close semantics, pending writes are not cancelled,
    // they're left to fail naturally once the peer or the channel goes away.
    tokio::spawn(run_writer(writer, rx, handle.clone()));
    on_connected(handle.clone());

    let reason = read_loop(id, &mut reader, &router, &subscriptions, &handle, config).await;
    handle.close();

    tracing::debug!(conn_id = id, error = %reason, "connection closed");
    reason
}

async fn read_loop<R>(
    id: u64,
    reader: &mut R,
    router: &Arc<Router>,
    subscriptions: &Arc<SubscriptionRegistry>,
    handle: &Arc<ConnectionHandle>,
    config: ConnectionConfig,
) -> ConnectionError
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut header_buf = [0u8; HEADER_LEN];
        if let Err(e) = with_idle_timeout(config.idle_timeout, reader.read_exact(&mut header_buf)).await {
            return e;
        }

        let header = match Header::decode(&header_buf) {
            Ok(h) => h,
            Err(e) => return ConnectionError::ProtocolError(e),
        };
        handle.touch();

        if header.is_heartbeat() {
            tracing::trace!(conn_id = id, "heartbeat");
            continue;
        }

        let mut body = vec![0u8; header.body_len as usize];
        if let Err(e) = with_idle_timeout(config.idle_timeout, reader.read_exact(&mut body)).await {
            return e;
        }

        // Dispatching: the idle timer is intentionally not armed here.
        match header.req_type {
            ReqType::ReqRes => {
                let responder_handle = handle.clone();
                let req_id = header.req_id;
                let responder: Arc<dyn Fn(Vec<u8>) + Send + Sync> =
                    Arc::new(move |body| responder_handle.respond(req_id, body));
                let outcome = router.route(header.func_id, &body, responder).await;
                if let Some(body) = outcome.body {
                    handle.respond(req_id, body);
                }
            }
            ReqType::SubPub => {
                match Codec::unpack::<(String, Option<String>)>(&body) {
                    Ok((topic, token)) => {
                        tracing::debug!(conn_id = id, %topic, "subscribed");
                        subscriptions.subscribe(topic, token, Arc::downgrade(handle));
                    }
                    Err(e) => {
                        tracing::warn!(conn_id = id, error = %e, "bad subscribe frame");
                    }
                }
            }
        }
    }
}

async fn with_idle_timeout<F, T>(idle_timeout: Duration, fut: F) -> Result<T, ConnectionError>
where
    F: std::future::Future<Output = std::io::Result<T>>,
{
    let result = if idle_timeout.is_zero() {
        fut.await
    } else {
        match tokio::time::timeout(idle_timeout, fut).await {
            Ok(r) => r,
            Err(_elapsed) => return Err(ConnectionError::IdleTimeout),
        }
    };
    result.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ConnectionError::SocketClosed
        } else {
            ConnectionError::ReadError(e)
        }
    })
}

async fn run_writer<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<OutboundFrame>,
    handle: Arc<ConnectionHandle>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        let bytes = if frame.req_id == 0 && matches!(frame.req_type, ReqType::SubPub) {
            encode_publish(&frame.body)
        } else {
            encode_response(frame.req_id, frame.req_type, &frame.body)
        };
        if let Err(e) = writer.write_all(&bytes).await {
            let error = ConnectionError::WriteError(e);
            tracing::debug!(%error, "write failed, closing connection");
            handle.close();
            break;
        }
    }
    let _ = writer.shutdown().await;
}
