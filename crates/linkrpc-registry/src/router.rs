use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use facet::Facet;
use linkrpc_wire::{Codec, MAX_BODY};
use parking_lot::RwLock;

use crate::context::{ExecMode, RouteOutcome, RpcContext};
use crate::error::RegistryError;
use crate::hash::hash32;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type Responder = Arc<dyn Fn(Vec<u8>) + Send + Sync>;

type Invoker = Box<dyn Fn(&[u8], Responder) -> BoxFuture<'static, RouteOutcome> + Send + Sync>;

struct Entry {
    name: Arc<str>,
    mode: ExecMode,
    invoker: Invoker,
}

/// Cap a response body to [`MAX_BODY`], replacing an oversized one with a
/// failure message rather than writing a frame the peer would reject.
pub(crate) fn finalize_response(name: &str, body: Vec<u8>) -> Vec<u8> {
    if body.len() as u32 >= MAX_BODY {
        Codec::pack_fail(&format!("the response result is out of range: more than 10M {name}"))
    } else {
        body
    }
}

/// The handler registry: maps a stable function id to a boxed invoker that
/// deserializes the request body, runs the handler, and serializes the
/// response body, per the dispatch trampoline approach noted as the
/// non-reflective fallback.
#[derive(Default)]
pub struct Router {
    entries: RwLock<HashMap<u32, Entry>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous handler: it returns its result directly and
    /// the router replies as soon as it comes back.
    pub fn register<F, Args, R>(&self, name: &str, handler: F) -> Result<(), RegistryError>
    where
        F: Fn(Args) -> Result<R, String> + Send + Sync + 'static,
        Args: Facet<'static> + Send + 'static,
        R: Facet<'static> + Send + 'static,
    {
        let display_name: Arc<str> = Arc::from(name);
        let invoke_name = display_name.clone();
        let invoker: Invoker = Box::new(move |body, _responder| {
            let display_name = invoke_name.clone();
            let outcome = match Codec::unpack::<Args>(body) {
                Ok(args) => {
                    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(args))) {
                        Ok(Ok(value)) => RouteOutcome::immediate(finalize_response(
                            &display_name,
                            Codec::pack_ok(&value),
                        )),
                        Ok(Err(message)) => {
                            tracing::debug!(name = %display_name, %message, "handler returned failure");
                            RouteOutcome::immediate(finalize_response(
                                &display_name,
                                Codec::pack_fail(&message),
                            ))
                        }
                        Err(_) => {
                            tracing::error!(name = %display_name, "handler panicked");
                            RouteOutcome::immediate(Codec::pack_fail(&format!(
                                "function_unknown_exception: {display_name} panicked"
                            )))
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(name = %display_name, error = %e, "bad arguments");
                    RouteOutcome::immediate(Codec::pack_fail(&format!(
                        "invalid_argument: {e}"
                    )))
                }
            };
            Box::pin(std::future::ready(outcome))
        });
        self.insert(hash32(name), display_name, ExecMode::Sync, invoker)
    }

    /// Register an async handler: it is handed an [`RpcContext`] and replies
    /// whenever it is ready, possibly from another task.
    pub fn register_async<F, Args>(&self, name: &str, handler: F) -> Result<(), RegistryError>
    where
        F: Fn(Args, RpcContext) + Send + Sync + 'static,
        Args: Facet<'static> + Send + 'static,
    {
        let display_name: Arc<str> = Arc::from(name);
        let invoke_name = display_name.clone();
        let invoker: Invoker = Box::new(move |body, responder| {
            let display_name = invoke_name.clone();
            let outcome = match Codec::unpack::<Args>(body) {
                Ok(args) => {
                    let ctx = RpcContext::new(display_name, responder);
                    handler(args, ctx);
                    RouteOutcome::deferred()
                }
                Err(e) => {
                    tracing::warn!(name = %display_name, error = %e, "bad arguments");
                    RouteOutcome::immediate(Codec::pack_fail(&format!(
                        "invalid_argument: {e}"
                    )))
                }
            };
            Box::pin(std::future::ready(outcome))
        });
        self.insert(hash32(name), display_name, ExecMode::Async, invoker)
    }

    fn insert(
        &self,
        id: u32,
        name: Arc<str>,
        mode: ExecMode,
        invoker: Invoker,
    ) -> Result<(), RegistryError> {
        let mut entries = self.entries.write();
        if entries.contains_key(&id) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        tracing::debug!(name = %name, func_id = id, ?mode, "registered handler");
        entries.insert(
            id,
            Entry {
                name,
                mode,
                invoker,
            },
        );
        Ok(())
    }

    /// Drop a handler. No-op if `name` was never registered.
    pub fn remove(&self, name: &str) {
        self.entries.write().remove(&hash32(name));
    }

    /// The registered name for a function id, for diagnostics and logging.
    pub fn name_for(&self, func_id: u32) -> Option<String> {
        self.entries.read().get(&func_id).map(|e| e.name.to_string())
    }

    pub fn mode_for(&self, func_id: u32) -> Option<ExecMode> {
        self.entries.read().get(&func_id).map(|e| e.mode)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Dispatch a request body to its handler.
    ///
    /// `responder` is called exactly once with the response body, either
    /// synchronously inside this call (sync handlers and all failure paths)
    /// or later from another task (async handlers). The returned
    /// [`RouteOutcome`] mirrors that: `body` is `Some` when the caller should
    /// write the response itself, `None` when the handler already took (or
    /// will take) responsibility for calling `responder`.
    pub fn route(
        &self,
        func_id: u32,
        body: &[u8],
        responder: Responder,
    ) -> BoxFuture<'static, RouteOutcome> {
        enum Dispatch {
            Invoke(BoxFuture<'static, RouteOutcome>),
            Unknown,
        }

        let dispatch = {
            let entries = self.entries.read();
            match entries.get(&func_id) {
                Some(entry) => Dispatch::Invoke((entry.invoker)(body, responder)),
                None => Dispatch::Unknown,
            }
        };

        match dispatch {
            Dispatch::Invoke(fut) => fut,
            Dispatch::Unknown => {
                // Mirrors `get_name_by_key`: look up a display name for this
                // id, falling back to the bare numeric id when none is
                // known. A name and its invoker are inserted and removed
                // together (see `insert`/`remove`), so this only ever
                // resolves a name for an id some other in-flight lookup
                // still holds — the overwhelmingly common case, a function
                // that was never registered at all, always falls back to
                // the numeric id, exactly as the original does.
                let label = self
                    .name_for(func_id)
                    .unwrap_or_else(|| func_id.to_string());
                let message = format!("unknown function: {label}");
                tracing::warn!(func_id, "no such function");
                Box::pin(std::future::ready(RouteOutcome::immediate(Codec::pack_fail(
                    &message,
                ))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn routes_known_function() {
        let router = Router::new();
        router
            .register("add", |(a, b): (i32, i32)| Ok::<_, String>(a + b))
            .unwrap();
        let func_id = hash32("add");
        let body = Codec::pack(&(2i32, 3i32));
        let last = Arc::new(parking_lot::Mutex::new(None));
        let last2 = last.clone();
        let responder: Responder = Arc::new(move |b| *last2.lock() = Some(b));
        let outcome = router.route(func_id, &body, responder).await;
        let body = outcome.body.expect("sync handler replies immediately");
        let (code, value): (linkrpc_wire::ResultCode, i32) =
            Codec::unpack_response(&body).unwrap();
        assert_eq!(code, linkrpc_wire::ResultCode::Ok);
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn unknown_function_fails_immediately() {
        let router = Router::new();
        let responder: Responder = Arc::new(|_| {});
        let outcome = router.route(0xdead_beef, &[], responder).await;
        let body = outcome.body.unwrap();
        let (code, message): (linkrpc_wire::ResultCode, String) =
            Codec::unpack_response(&body).unwrap();
        assert_eq!(code, linkrpc_wire::ResultCode::Fail);
        assert!(message.contains("unknown function"));
    }

    #[tokio::test]
    async fn bad_arguments_fail_before_handler_runs() {
        let router = Router::new();
        router
            .register("add", |(a, b): (i32, i32)| Ok::<_, String>(a + b))
            .unwrap();
        let func_id = hash32("add");
        let responder: Responder = Arc::new(|_| {});
        let outcome = router.route(func_id, &[0xff, 0xff, 0xff], responder).await;
        let body = outcome.body.unwrap();
        let (code, message): (linkrpc_wire::ResultCode, String) =
            Codec::unpack_response(&body).unwrap();
        assert_eq!(code, linkrpc_wire::ResultCode::Fail);
        assert!(message.contains("invalid_argument"));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let router = Router::new();
        router
            .register("add", |(a, b): (i32, i32)| Ok::<_, String>(a + b))
            .unwrap();
        let err = router
            .register("add", |(a, b): (i32, i32)| Ok::<_, String>(a - b))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("add".to_string()));
    }

    #[tokio::test]
    async fn async_handler_defers_and_responds_once() {
        let router = Router::new();
        router
            .register_async("slow_add", |(a, b): (i32, i32), ctx: RpcContext| {
                ctx.respond_ok(&(a + b)).unwrap();
                assert!(matches!(
                    ctx.respond_ok(&(a + b)),
                    Err(RegistryError::HasResponse(_))
                ));
            })
            .unwrap();
        let func_id = hash32("slow_add");
        let body = Codec::pack(&(2i32, 3i32));
        let last = Arc::new(parking_lot::Mutex::new(None));
        let last2 = last.clone();
        let responder: Responder = Arc::new(move |b| *last2.lock() = Some(b));
        let outcome = router.route(func_id, &body, responder).await;
        assert!(outcome.body.is_none());
        let body = last.lock().take().expect("responder was invoked");
        let (code, value): (linkrpc_wire::ResultCode, i32) =
            Codec::unpack_response(&body).unwrap();
        assert_eq!(code, linkrpc_wire::ResultCode::Ok);
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn oversized_response_is_replaced_with_a_failure_message() {
        let router = Router::new();
        router
            .register("blob", |_: ()| Ok::<_, String>(vec![0u8; MAX_BODY as usize]))
            .unwrap();
        let func_id = hash32("blob");
        let body = Codec::pack(&());
        let responder: Responder = Arc::new(|_| {});
        let outcome = router.route(func_id, &body, responder).await;
        let packed = outcome.body.expect("sync handler replies immediately");
        let (code, message): (linkrpc_wire::ResultCode, String) =
            Codec::unpack_response(&packed).unwrap();
        assert_eq!(code, linkrpc_wire::ResultCode::Fail);
        assert_eq!(
            message,
            "the response result is out of range: more than 10M blob"
        );
    }

    #[test]
    fn remove_drops_the_entry() {
        let router = Router::new();
        router
            .register("add", |(a, b): (i32, i32)| Ok::<_, String>(a + b))
            .unwrap();
        assert_eq!(router.len(), 1);
        router.remove("add");
        assert!(router.is_empty());
        assert!(router.name_for(hash32("add")).is_none());
    }
}
