//! Accept loop, connection map and publish fan-out for a `linkrpc` server.
//!
//! Built on [`linkrpc_core::serve_connection`]: this crate's job is the
//! parts the connection state machine doesn't know about — binding a
//! listener, allocating connection ids, keeping the live connection map, and
//! running the background sweeps.

mod config;
mod error;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use facet::Facet;
use linkrpc_core::{ConnectionConfig, ConnectionHandle, SubscriptionRegistry};
use linkrpc_registry::Router;
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

pub use config::ServerConfig;
pub use error::ServerError;

/// A running (or not-yet-started) `linkrpc` server.
///
/// Always held behind an `Arc`: the accept loop, the sweep task and every
/// connection task hold a clone, and the connection map is the single
/// source of truth for which connections are alive, per the spec's
/// owner-map design note.
pub struct Server {
    config: ServerConfig,
    router: Arc<Router>,
    subscriptions: Arc<SubscriptionRegistry>,
    connections: Mutex<HashMap<u64, Arc<ConnectionHandle>>>,
    next_conn_id: AtomicU64,
    stop_signal: Notify,
    stopping: AtomicBool,
}

impl Server {
    pub fn new(config: ServerConfig, router: Arc<Router>) -> Arc<Self> {
        Arc::new(Self {
            config,
            router,
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            connections: Mutex::new(HashMap::new()),
            next_conn_id: AtomicU64::new(1),
            stop_signal: Notify::new(),
            stopping: AtomicBool::new(false),
        })
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Fan out `value` to every subscriber of `topic`, string-keyed variant.
    pub fn publish<T: Facet<'static>>(&self, topic: &str, value: &T) {
        self.subscriptions.publish(topic, value);
    }

    /// As [`Self::publish`], delivered only to subscribers with a matching
    /// token.
    pub fn publish_by_token<T: Facet<'static>>(&self, topic: &str, token: &str, value: &T) {
        self.subscriptions.publish_by_token(topic, token, value);
    }

    /// Live subscription tokens, ported from the original's
    /// `get_token_list()`.
    pub fn subscribed_tokens(&self) -> std::collections::HashSet<String> {
        self.subscriptions.subscribed_tokens()
    }

    /// Bind and run the accept loop until [`Self::stop`] is called.
    ///
    /// `start`/`stop` are one-shot per the spec: calling `serve` again after
    /// `stop` starts a fresh listener (the idempotence guarantee is on
    /// `stop`, not on reusing a single run).
    pub async fn serve(self: Arc<Self>) -> Result<SocketAddr, ServerError> {
        let listener =
            TcpListener::bind(self.config.bind_addr)
                .await
                .map_err(|source| ServerError::Bind {
                    addr: self.config.bind_addr,
                    source,
                })?;
        let local_addr = listener.local_addr().unwrap_or(self.config.bind_addr);
        tracing::info!(addr = %local_addr, "listening");

        let sweeper = self.clone();
        tokio::spawn(async move { sweeper.run_sweep_loop().await });

        let accept_loop = self.clone();
        tokio::spawn(async move { accept_loop.run_accept_loop(listener).await });

        Ok(local_addr)
    }

    async fn run_accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            tokio::select! {
                _ = self.stop_signal.notified() => {
                    tracing::info!("server stopping");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.clone().accept(stream, peer),
                        Err(e) => tracing::warn!(error = %e, "accept failed"),
                    }
                }
            }
        }

        for (_, handle) in self.connections.lock().drain() {
            handle.close();
        }
    }

    fn accept(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        if self.config.tcp_nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(error = %e, "failed to set TCP_NODELAY");
            }
        }
        let id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(conn_id = id, %peer, "connection accepted");
        tokio::spawn(async move { self.drive_connection(id, stream).await });
    }

    async fn drive_connection(self: Arc<Self>, id: u64, stream: TcpStream) {
        let connections = &self.connections;
        let conn_config = ConnectionConfig {
            idle_timeout: self.config.idle_timeout,
        };
        let reason = linkrpc_core::serve_connection(
            id,
            stream,
            self.router.clone(),
            self.subscriptions.clone(),
            conn_config,
            move |handle| {
                connections.lock().insert(id, handle);
            },
        )
        .await;
        self.connections.lock().remove(&id);
        tracing::debug!(conn_id = id, error = %reason, "connection removed");
    }

    async fn run_sweep_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        loop {
            ticker.tick().await;
            self.subscriptions.sweep();

            if let Some(max_age) = self.config.conn_max_age {
                let stale: Vec<Arc<ConnectionHandle>> = self
                    .connections
                    .lock()
                    .values()
                    .filter(|h| h.idle_for() >= max_age)
                    .cloned()
                    .collect();
                for handle in stale {
                    tracing::debug!(conn_id = handle.id(), "closing aged-out connection");
                    handle.close();
                }
            }
        }
    }

    /// Idempotent: only the first call actually signals the accept loop.
    pub fn stop(&self) {
        if !self.stopping.swap(true, Ordering::SeqCst) {
            self.stop_signal.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use linkrpc_wire::{encode_request, Codec, ResultCode, HEADER_LEN};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use super::*;

    #[tokio::test]
    async fn serves_one_request_over_a_real_socket() {
        let router = Arc::new(Router::new());
        router
            .register("add", |(a, b): (i32, i32)| Ok::<_, String>(a + b))
            .unwrap();

        let server = Server::new(
            ServerConfig {
                bind_addr: "127.0.0.1:0".parse().unwrap(),
                idle_timeout: Duration::from_secs(5),
                ..Default::default()
            },
            router,
        );
        let addr = server.clone().serve().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let func_id = linkrpc_registry::hash32("add");
        let request = encode_request(7, func_id, &Codec::pack(&(4i32, 5i32)));
        client.write_all(&request).await.unwrap();

        let mut header_buf = [0u8; HEADER_LEN];
        client.read_exact(&mut header_buf).await.unwrap();
        let header = linkrpc_wire::Header::decode(&header_buf).unwrap();
        let mut body = vec![0u8; header.body_len as usize];
        client.read_exact(&mut body).await.unwrap();
        let (code, value): (ResultCode, i32) = Codec::unpack_response(&body).unwrap();

        assert_eq!(header.req_id, 7);
        assert_eq!(code, ResultCode::Ok);
        assert_eq!(value, 9);

        server.stop();
    }

    #[tokio::test]
    async fn s4_idle_timeout_closes_connection() {
        let server = Server::new(
            ServerConfig {
                bind_addr: "127.0.0.1:0".parse().unwrap(),
                idle_timeout: Duration::from_millis(100),
                ..Default::default()
            },
            Arc::new(Router::new()),
        );
        let addr = server.clone().serve().await.unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        // Send nothing and let the idle timer expire; the server's read loop
        // returns `IdleTimeout`, drops its connection handle, and the writer
        // task shuts its half down, which the client observes as EOF.
        let mut buf = [0u8; 1];
        let result = tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .expect("server should close the idle connection well within 2s");
        assert!(result.is_err());

        server.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let server = Server::new(ServerConfig::default(), Arc::new(Router::new()));
        server.clone().serve().await.unwrap();
        server.stop();
        server.stop();
    }
}
