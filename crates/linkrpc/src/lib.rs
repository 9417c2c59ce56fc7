//! `linkrpc`: a length-framed, message-oriented RPC runtime.
//!
//! This is the single crate most users depend on directly; it re-exports the
//! public surface of the five core crates (`linkrpc-wire`, `linkrpc-registry`,
//! `linkrpc-core`, `linkrpc-server`, `linkrpc-client`) and adds two
//! convenience macros, [`register_fn!`] and [`call!`].
//!
//! ```no_run
//! use linkrpc::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let router = Router::new();
//! register_fn!(router, add, |(a, b): (i32, i32)| Ok::<_, String>(a + b));
//!
//! let server = Server::new(ServerConfig::default(), std::sync::Arc::new(router));
//! let addr = server.serve().await?;
//!
//! let client = Client::new(addr, ClientConfig::default());
//! client.connect().await?;
//! let sum: i32 = call!(client, add, (1i32, 2i32)).await?;
//! # Ok(())
//! # }
//! ```

pub use linkrpc_client::{Client, ClientConfig, ClientError};
pub use linkrpc_core::{
    serve_connection, ConnectionConfig, ConnectionError, ConnectionHandle, SubscriptionRegistry,
};
pub use linkrpc_registry::{hash32, ExecMode, RegistryError, RouteOutcome, Router, RpcContext};
pub use linkrpc_server::{Server, ServerConfig, ServerError};
pub use linkrpc_wire::{
    decode_header, encode_publish, encode_request, encode_response, Codec, CodecError, Frame,
    Header, ReqType, ResultCode, HEADER_LEN, MAGIC, MAX_BODY,
};

/// The commonly-needed set, for `use linkrpc::prelude::*;`.
pub mod prelude {
    pub use crate::{
        Client, ClientConfig, ClientError, Router, Server, ServerConfig, ServerError,
    };
    pub use crate::{call, register_fn};
}

/// Register a synchronous handler under its own name, resolving the
/// "compile-time function name reflection" design note's documented
/// fallback: the name is given explicitly here, at registration time,
/// rather than recovered from the handler's type.
///
/// `register_fn!(router, add, |(a, b): (i32, i32)| Ok::<_, String>(a + b))`
/// expands to `router.register(stringify!(add), ...)`.
#[macro_export]
macro_rules! register_fn {
    ($router:expr, $name:ident, $handler:expr) => {
        $router.register(stringify!($name), $handler)
    };
}

/// Register an async handler (one handed an [`RpcContext`] to reply later)
/// under its own name, the async counterpart to [`register_fn!`].
#[macro_export]
macro_rules! register_async_fn {
    ($router:expr, $name:ident, $handler:expr) => {
        $router.register_async(stringify!($name), $handler)
    };
}

/// Call a registered function by its bare name instead of a string literal:
/// `call!(client, add, (1, 2))` expands to `client.call(stringify!(add), (1, 2))`.
#[macro_export]
macro_rules! call {
    ($client:expr, $name:ident, $args:expr) => {
        $client.call(stringify!($name), $args)
    };
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::prelude::*;

    #[tokio::test]
    async fn register_fn_and_call_macros_round_trip() {
        let router = Router::new();
        register_fn!(router, add, |(a, b): (i32, i32)| Ok::<_, String>(a + b)).unwrap();

        let server = Server::new(ServerConfig::default(), Arc::new(router));
        let addr = server.serve().await.unwrap();

        let client = Client::new(addr, ClientConfig::default());
        client.connect().await.unwrap();

        let sum: i32 = call!(client, add, (2i32, 3i32)).await.unwrap();
        assert_eq!(sum, 5);
    }
}
