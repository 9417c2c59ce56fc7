use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use facet::Facet;
use linkrpc_wire::Codec;

use crate::error::RegistryError;

/// How a registered handler produces its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// The handler returns its result directly; the router replies as soon
    /// as it comes back.
    Sync,
    /// The handler is handed an [`RpcContext`] and may reply at any later
    /// point, including from another task.
    Async,
}

/// Outcome of routing one request to completion.
///
/// `body` is `None` when the handler is async and has not replied yet: the
/// caller supplied a responder closure that will eventually be invoked
/// out-of-band, and there is nothing to write now.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub body: Option<Vec<u8>>,
}

impl RouteOutcome {
    pub(crate) fn immediate(body: Vec<u8>) -> Self {
        Self { body: Some(body) }
    }

    pub(crate) fn deferred() -> Self {
        Self { body: None }
    }
}

/// Handed to an async handler so it can send its response whenever it is
/// ready, from any task. Enforces the "respond exactly once" rule: a second
/// call to either `respond_*` method returns [`RegistryError::HasResponse`].
#[derive(Clone)]
pub struct RpcContext {
    name: Arc<str>,
    responder: Arc<dyn Fn(Vec<u8>) + Send + Sync>,
    sent: Arc<AtomicBool>,
}

impl RpcContext {
    pub(crate) fn new(name: Arc<str>, responder: Arc<dyn Fn(Vec<u8>) + Send + Sync>) -> Self {
        Self {
            name,
            responder,
            sent: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Send a successful response: `(OK, value)`.
    pub fn respond_ok<T: Facet<'static>>(&self, value: &T) -> Result<(), RegistryError> {
        self.send(Codec::pack_ok(value))
    }

    /// Send a failure response: `(FAIL, message)`.
    pub fn respond_fail(&self, message: &str) -> Result<(), RegistryError> {
        self.send(Codec::pack_fail(message))
    }

    fn send(&self, body: Vec<u8>) -> Result<(), RegistryError> {
        if self
            .sent
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RegistryError::HasResponse(self.name.to_string()));
        }
        (self.responder)(crate::router::finalize_response(&self.name, body));
        Ok(())
    }
}
