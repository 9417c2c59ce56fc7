//! Request/response and pub/sub multiplexer for a `linkrpc` client.
//!
//! A single pending table (`oneshot::Sender` per in-flight request id) backs
//! both call styles named in the spec: `call`/`async_call` await the
//! receiver directly, `async_call` with a callback spawns a task that awaits
//! it and then invokes the callback. This discards the source's "high bit
//! tags callback vs. future" convention in favor of the simplification its
//! own design notes sanction: one table, no tag, same observable contract.

mod config;
mod error;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use facet::Facet;
use linkrpc_registry::hash32;
use linkrpc_wire::{encode_publish, encode_request, Codec, Header, ReqType, ResultCode, HEADER_LEN};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};

pub use config::ClientConfig;
pub use error::ClientError;

type SubscriberFn = Arc<dyn Fn(&[u8]) + Send + Sync>;

struct Subscription {
    token: Option<String>,
    handler: SubscriberFn,
}

/// A `linkrpc` client connection. Always held behind an `Arc`: background
/// tasks (writer, reader, heartbeat, reconnect) each hold a clone.
pub struct Client {
    addr: SocketAddr,
    config: ClientConfig,
    req_id_seq: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Vec<u8>, ClientError>>>>,
    subscriptions: Mutex<HashMap<String, Vec<Subscription>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    connected: AtomicBool,
    reconnects_left: AtomicI64,
    on_error: Mutex<Option<Box<dyn Fn(ClientError) + Send + Sync>>>,
}

impl Client {
    pub fn new(addr: SocketAddr, config: ClientConfig) -> Arc<Self> {
        let reconnect_count = config.reconnect_count;
        Arc::new(Self {
            addr,
            config,
            req_id_seq: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
            outbound: Mutex::new(None),
            connected: AtomicBool::new(false),
            reconnects_left: AtomicI64::new(reconnect_count),
            on_error: Mutex::new(None),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Invoked at most once per disconnect, mirroring the source's
    /// per-client error callback.
    pub fn set_error_callback(&self, cb: impl Fn(ClientError) + Send + Sync + 'static) {
        *self.on_error.lock() = Some(Box::new(cb));
    }

    /// Connect, retrying per the reconnect policy until success or the
    /// retry counter is exhausted. On success, resends every registered
    /// subscription.
    pub async fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        self.reconnects_left
            .store(self.config.reconnect_count, Ordering::SeqCst);
        self.retry_connect().await
    }

    async fn retry_connect(self: &Arc<Self>) -> Result<(), ClientError> {
        loop {
            match self.connect_once().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    let left = self.reconnects_left.load(Ordering::SeqCst);
                    if left == 0 {
                        return Err(e);
                    }
                    if left > 0 {
                        self.reconnects_left.store(left - 1, Ordering::SeqCst);
                    }
                    tracing::debug!(error = %e, "connect attempt failed, retrying");
                    tokio::time::sleep(self.config.reconnect_delay).await;
                }
            }
        }
    }

    async fn connect_once(self: &Arc<Self>) -> Result<(), ClientError> {
        let stream = match tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(ClientError::from(e)),
            Err(_elapsed) => return Err(ClientError::ConnectTimeout(self.config.connect_timeout)),
        };
        if self.config.tcp_nodelay {
            let _ = stream.set_nodelay(true);
        }

        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock() = Some(tx);
        self.connected.store(true, Ordering::SeqCst);
        self.reconnects_left
            .store(self.config.reconnect_count, Ordering::SeqCst);

        let writer_client = self.clone();
        tokio::spawn(async move { writer_client.run_writer(writer, rx).await });
        let reader_client = self.clone();
        tokio::spawn(async move { reader_client.run_reader(reader).await });
        if let Some(interval) = self.config.heartbeat_interval {
            let hb_client = self.clone();
            tokio::spawn(async move { hb_client.run_heartbeat(interval).await });
        }

        self.resend_subscriptions();
        tracing::info!(addr = %self.addr, "connected");
        Ok(())
    }

    async fn run_writer(self: Arc<Self>, mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
        while let Some(bytes) = rx.recv().await {
            // A genuine write failure, unlike the read path, is never an
            // `UnexpectedEof` — use a dedicated conversion so it surfaces as
            // `WriteError` rather than through the read-oriented blanket
            // `From<io::Error>`.
            if let Err(e) = writer.write_all(&bytes).await {
                self.handle_disconnect(ClientError::WriteError(e.to_string()));
                return;
            }
        }
    }

    async fn run_reader(self: Arc<Self>, mut reader: OwnedReadHalf) {
        loop {
            let mut header_buf = [0u8; HEADER_LEN];
            if let Err(e) = reader.read_exact(&mut header_buf).await {
                self.handle_disconnect(ClientError::from(e));
                return;
            }
            let header = match Header::decode(&header_buf) {
                Ok(h) => h,
                Err(e) => {
                    self.handle_disconnect(ClientError::ProtocolError(e.to_string()));
                    return;
                }
            };
            if header.is_heartbeat() {
                continue;
            }
            let mut body = vec![0u8; header.body_len as usize];
            if let Err(e) = reader.read_exact(&mut body).await {
                self.handle_disconnect(ClientError::from(e));
                return;
            }

            match header.req_type {
                ReqType::ReqRes => self.complete(header.req_id, body),
                ReqType::SubPub => self.dispatch_publish(&body),
            }
        }
    }

    async fn run_heartbeat(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if !self.is_connected() {
                return;
            }
            let _ = self.send_frame(encode_request(0, 0, &[]));
        }
    }

    fn complete(&self, req_id: u64, body: Vec<u8>) {
        if let Some(tx) = self.pending.lock().remove(&req_id) {
            let _ = tx.send(Ok(body));
        }
    }

    fn dispatch_publish(&self, body: &[u8]) {
        let (topic, inner) = match Codec::unpack_envelope(body) {
            Ok((ResultCode::Ok, env)) => match Codec::unpack::<(String, Vec<u8>)>(&env) {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "bad publish envelope");
                    return;
                }
            },
            Ok((ResultCode::Fail, _)) => return,
            Err(e) => {
                tracing::warn!(error = %e, "bad publish frame");
                return;
            }
        };
        let subs = self.subscriptions.lock();
        if let Some(entries) = subs.get(&topic) {
            for entry in entries {
                (entry.handler)(&inner);
            }
        }
    }

    fn handle_disconnect(self: &Arc<Self>, err: ClientError) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(error = %err, "disconnected");
        self.outbound.lock().take();
        for (_, tx) in self.pending.lock().drain() {
            let _ = tx.send(Err(err.clone()));
        }
        if let Some(cb) = self.on_error.lock().as_ref() {
            cb(err.clone());
        }
        if self.config.auto_reconnect {
            let client = self.clone();
            tokio::spawn(async move {
                let _ = client.connect().await;
            });
        }
    }

    fn next_req_id(&self) -> u64 {
        self.req_id_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn send_frame(&self, bytes: Vec<u8>) -> Result<(), ClientError> {
        match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(bytes).map_err(|_| ClientError::SocketClosed),
            None => Err(ClientError::SocketClosed),
        }
    }

    fn enqueue_request(
        &self,
        func_id: u32,
        body: Vec<u8>,
    ) -> Result<(u64, oneshot::Receiver<Result<Vec<u8>, ClientError>>), ClientError> {
        let req_id = self.next_req_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(req_id, tx);
        if let Err(e) = self.send_frame(encode_request(req_id, func_id, &body)) {
            self.pending.lock().remove(&req_id);
            return Err(e);
        }
        Ok((req_id, rx))
    }

    /// `async_call<future>`: posts the request, returns a future completing
    /// with the decoded result. Never times out on its own; `call` layers a
    /// deadline on top.
    pub async fn async_call<Args, R>(&self, name: &str, args: Args) -> Result<R, ClientError>
    where
        Args: Facet<'static>,
        R: Facet<'static>,
    {
        let (_req_id, rx) = self.enqueue_request(hash32(name), Codec::pack(&args))?;
        let raw = rx.await.map_err(|_| ClientError::SocketClosed)??;
        decode_result(&raw)
    }

    /// `call<R>`: synchronous-feeling wrapper around `async_call`, bounded by
    /// `config.wait_timeout`.
    pub async fn call<Args, R>(&self, name: &str, args: Args) -> Result<R, ClientError>
    where
        Args: Facet<'static>,
        R: Facet<'static>,
    {
        let (req_id, rx) = self.enqueue_request(hash32(name), Codec::pack(&args))?;
        match tokio::time::timeout(self.config.wait_timeout, rx).await {
            Ok(Ok(Ok(raw))) => decode_result(&raw),
            Ok(Ok(Err(transport_err))) => Err(transport_err),
            Ok(Err(_canceled)) => Err(ClientError::SocketClosed),
            Err(_elapsed) => {
                self.pending.lock().remove(&req_id);
                Err(ClientError::RequestTimeout)
            }
        }
    }

    /// `async_call<callback>`: posts the request and invokes `cb` exactly
    /// once, either with the decoded result or with `Timeout` if `timeout`
    /// elapses first (in which case the later server response, if any, is
    /// discarded silently).
    pub fn call_with_callback<Args, R>(
        self: &Arc<Self>,
        name: &str,
        args: Args,
        timeout: Option<Duration>,
        cb: impl FnOnce(Result<R, ClientError>) + Send + 'static,
    ) where
        Args: Facet<'static> + Send + 'static,
        R: Facet<'static> + Send + 'static,
    {
        let client = self.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            let enqueued = client.enqueue_request(hash32(&name), Codec::pack(&args));
            let (req_id, rx) = match enqueued {
                Ok(v) => v,
                Err(e) => {
                    cb(Err(e));
                    return;
                }
            };
            let outcome = match timeout {
                Some(d) => match tokio::time::timeout(d, rx).await {
                    Ok(Ok(Ok(raw))) => decode_result(&raw),
                    Ok(Ok(Err(transport_err))) => Err(transport_err),
                    Ok(Err(_canceled)) => Err(ClientError::SocketClosed),
                    Err(_elapsed) => {
                        client.pending.lock().remove(&req_id);
                        Err(ClientError::RequestTimeout)
                    }
                },
                None => match rx.await {
                    Ok(Ok(raw)) => decode_result(&raw),
                    Ok(Err(transport_err)) => Err(transport_err),
                    Err(_canceled) => Err(ClientError::SocketClosed),
                },
            };
            cb(outcome);
        });
    }

    /// Register a callback for `topic` (optionally scoped by `token`), and
    /// send the subscribe frame. Re-sent automatically on reconnect.
    pub fn subscribe<T, F>(&self, topic: &str, token: Option<&str>, cb: F)
    where
        T: Facet<'static> + Send + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let handler: SubscriberFn = Arc::new(move |bytes: &[u8]| match Codec::unpack::<T>(bytes) {
            Ok(value) => cb(value),
            Err(e) => tracing::warn!(error = %e, "bad publish payload"),
        });
        self.subscriptions
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(Subscription {
                token: token.map(str::to_string),
                handler,
            });
        self.send_subscribe_frame(topic, token);
    }

    fn send_subscribe_frame(&self, topic: &str, token: Option<&str>) {
        let body = Codec::pack(&(topic.to_string(), token.map(str::to_string)));
        let _ = self.send_frame(encode_publish(&body));
    }

    fn resend_subscriptions(&self) {
        let subs = self.subscriptions.lock();
        for (topic, entries) in subs.iter() {
            for entry in entries {
                self.send_subscribe_frame(topic, entry.token.as_deref());
            }
        }
    }

    /// Sugar for calling the server's conventional `publish` RPC function,
    /// per `spec.md` §4.6.
    pub async fn publish(&self, topic: &str, token: Option<&str>, value: Vec<u8>) -> Result<(), ClientError> {
        self.async_call(
            "publish",
            (topic.to_string(), token.map(str::to_string), value),
        )
        .await
    }
}

fn decode_result<R: Facet<'static>>(raw: &[u8]) -> Result<R, ClientError> {
    let (code, inner) = Codec::unpack_envelope(raw).map_err(|e| ClientError::ProtocolError(e.to_string()))?;
    match code {
        ResultCode::Ok => Codec::unpack::<R>(&inner).map_err(|e| ClientError::ProtocolError(e.to_string())),
        ResultCode::Fail => {
            let message: String =
                Codec::unpack(&inner).map_err(|e| ClientError::ProtocolError(e.to_string()))?;
            Err(ClientError::RemoteFailure(message))
        }
    }
}
