//! Shared runtime: the per-connection state machine, its error types, and
//! the pub/sub subscription registry that rides the same transport.
//!
//! This crate is deliberately generic over the transport (`AsyncRead +
//! AsyncWrite`) and knows nothing about listening sockets or client
//! reconnect policy — those live in `linkrpc-server` and `linkrpc-client`
//! respectively, both built on top of [`connection::serve_connection`].

pub mod connection;
mod error;
mod handle;
pub mod pubsub;
pub mod testing;

pub use connection::{serve_connection, ConnectionConfig};
pub use error::ConnectionError;
pub use handle::ConnectionHandle;
pub use pubsub::SubscriptionRegistry;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use linkrpc_registry::Router;
    use linkrpc_wire::{encode_request, Codec, ResultCode, HEADER_LEN};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn round_trips_a_request_over_a_duplex_pipe() {
        let router = Arc::new(Router::new());
        router
            .register("add", |(a, b): (i32, i32)| Ok::<_, String>(a + b))
            .unwrap();

        let (mut client_side, server_side) = testing::duplex_pair(4096);
        let subs = Arc::new(SubscriptionRegistry::new());
        tokio::spawn(serve_connection(
            1,
            server_side,
            router,
            subs,
            ConnectionConfig {
                idle_timeout: Duration::ZERO,
            },
            |_handle| {},
        ));

        let func_id = linkrpc_registry::hash32("add");
        let request = encode_request(1, func_id, &Codec::pack(&(2i32, 3i32)));
        client_side.write_all(&request).await.unwrap();

        let mut header_buf = [0u8; HEADER_LEN];
        client_side.read_exact(&mut header_buf).await.unwrap();
        let header = linkrpc_wire::Header::decode(&header_buf).unwrap();
        let mut body = vec![0u8; header.body_len as usize];
        client_side.read_exact(&mut body).await.unwrap();

        let (code, value): (ResultCode, i32) = Codec::unpack_response(&body).unwrap();
        assert_eq!(code, ResultCode::Ok);
        assert_eq!(value, 5);
        assert_eq!(header.req_id, 1);
    }

    #[tokio::test]
    async fn heartbeat_never_reaches_the_router() {
        let router = Arc::new(Router::new());
        let hit = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let hit2 = hit.clone();
        router
            .register("never", move |(): ()| {
                hit2.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, String>(())
            })
            .unwrap();

        let (mut client_side, server_side) = testing::duplex_pair(4096);
        let subs = Arc::new(SubscriptionRegistry::new());
        tokio::spawn(serve_connection(
            2,
            server_side,
            router,
            subs,
            ConnectionConfig {
                idle_timeout: Duration::from_millis(200),
            },
            |_handle| {},
        ));

        // A heartbeat is a bare header with a zero body length.
        let heartbeat = linkrpc_wire::Header::new(linkrpc_wire::ReqType::ReqRes, 0, 0, 0).encode();
        client_side.write_all(&heartbeat).await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!hit.load(std::sync::atomic::Ordering::SeqCst));
    }
}
