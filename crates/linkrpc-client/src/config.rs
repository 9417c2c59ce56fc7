use std::time::Duration;

/// Client-side knobs, per `spec.md` §6's configuration table.
///
/// `cross_ending` is intentionally absent, see `DESIGN.md`: only the
/// canonical little-endian header is implemented.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    /// Remaining reconnect attempts; `-1` means unlimited, per the original.
    pub reconnect_count: i64,
    pub reconnect_delay: Duration,
    /// `call`'s wait timeout; `async_call` itself never times out on its own.
    pub wait_timeout: Duration,
    pub auto_reconnect: bool,
    /// `None` disables the heartbeat timer.
    pub heartbeat_interval: Option<Duration>,
    pub tcp_nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(1000),
            reconnect_count: -1,
            reconnect_delay: Duration::from_secs(1),
            wait_timeout: Duration::from_secs(5),
            auto_reconnect: false,
            heartbeat_interval: None,
            tcp_nodelay: true,
        }
    }
}
