use std::net::SocketAddr;
use std::time::Duration;

/// Server-side knobs, per `spec.md` §6's configuration table.
///
/// `cross_ending` (the 40-byte network-byte-order header variant) is
/// intentionally absent: only the canonical little-endian header is
/// implemented, see `DESIGN.md`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Worker threads for the runtime the binary builds to run [`crate::Server`].
    /// Defaults to the host's available parallelism, mirroring the original's
    /// `io_context_pool` sizing.
    pub worker_threads: usize,
    /// `spec.md`'s `timeout_seconds`; `Duration::ZERO` disables idle timeout.
    pub idle_timeout: Duration,
    /// `spec.md`'s `check_seconds`: the subscription sweep interval.
    pub sweep_interval: Duration,
    /// `spec.md`'s `conn_max_age`; `None` disables the connection-age sweep.
    pub conn_max_age: Option<Duration>,
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            idle_timeout: Duration::from_secs(15),
            sweep_interval: Duration::from_secs(10),
            conn_max_age: None,
            tcp_nodelay: true,
        }
    }
}
