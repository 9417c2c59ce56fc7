use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use linkrpc_wire::ReqType;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// One frame waiting to be written, in enqueue order.
pub(crate) struct OutboundFrame {
    pub req_id: u64,
    pub req_type: ReqType,
    pub body: Vec<u8>,
}

/// A cheaply-clonable, `Send + Sync` reference to a live connection.
///
/// Enqueuing onto `outbound` is the only way anything outside the
/// connection's own read loop talks to it: the receiving end is drained by a
/// single dedicated writer task, so frames are written in enqueue order with
/// at most one write in flight, matching the "FIFO, kick off the write only
/// if the queue was previously empty" invariant without hand-rolled
/// bookkeeping — an unbounded mpsc channel already gives both properties.
pub struct ConnectionHandle {
    id: u64,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    closed: Arc<AtomicBool>,
    last_io: Mutex<Instant>,
}

impl ConnectionHandle {
    pub(crate) fn new(id: u64, outbound: mpsc::UnboundedSender<OutboundFrame>) -> Self {
        Self {
            id,
            outbound,
            closed: Arc::new(AtomicBool::new(false)),
            last_io: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Record that a full message (not just a heartbeat) just arrived.
    pub(crate) fn touch(&self) {
        *self.last_io.lock() = Instant::now();
    }

    /// How long it has been since the last message from this connection.
    pub fn idle_for(&self) -> std::time::Duration {
        self.last_io.lock().elapsed()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queue a `req_res` response. A closed connection silently drops the
    /// frame: the writer task is already gone, and the caller (a handler or
    /// an `RpcContext`) should not have to special-case that race.
    pub fn respond(&self, req_id: u64, body: Vec<u8>) {
        let _ = self.outbound.send(OutboundFrame {
            req_id,
            req_type: ReqType::ReqRes,
            body,
        });
    }

    /// Queue a `sub_pub` publish frame (`req_id = 0`).
    pub fn publish(&self, body: Vec<u8>) {
        let _ = self.outbound.send(OutboundFrame {
            req_id: 0,
            req_type: ReqType::SubPub,
            body,
        });
    }

    /// Idempotent: mark the connection closed. The read loop notices on its
    /// next iteration; the writer task notices when the channel drains.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
