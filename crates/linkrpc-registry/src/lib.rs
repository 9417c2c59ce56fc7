//! Handler registry and dispatch trampolines.
//!
//! A [`Router`] maps a stable function id (derived from a registered name via
//! [`hash32`]) to a boxed "invoker" closure that deserializes a request body,
//! calls the handler, and serializes the response body. This is the
//! non-reflective fallback noted for runtimes without compile-time function
//! name reflection: the name is supplied explicitly at registration instead
//! of recovered from the handler's type.
//!
//! This crate knows nothing about sockets or connections. Handing it a
//! `responder` closure per request is how async handlers reply without this
//! crate depending on the transport layer.

mod context;
mod error;
mod hash;
mod router;

pub use context::{ExecMode, RouteOutcome, RpcContext};
pub use error::RegistryError;
pub use hash::hash32;
pub use router::Router;
