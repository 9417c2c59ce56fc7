//! Example `linkrpc` server: registers a couple of arithmetic/echo handlers
//! plus the conventional `publish` RPC that `Client::publish` calls into.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use clap::Parser;
use linkrpc::prelude::*;

#[derive(Parser, Debug)]
#[command(about = "Example linkrpc server")]
struct Args {
    /// Address to bind the listener to.
    #[arg(long, default_value = "127.0.0.1:7700")]
    bind: std::net::SocketAddr,

    /// Idle timeout, in seconds. 0 disables it.
    #[arg(long, default_value_t = 15)]
    idle_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let router = Router::new();
    register_fn!(router, add, |(a, b): (i32, i32)| Ok::<_, String>(a + b)).unwrap();
    register_fn!(router, echo, |message: String| Ok::<_, String>(message)).unwrap();

    // `publish` forwards into `Server::publish`/`publish_by_token`, so the
    // handler needs a reference to the server it's about to be registered
    // into. Resolved with the usual construct-then-fill indirection.
    let server_cell: Arc<OnceLock<Arc<Server>>> = Arc::new(OnceLock::new());
    let publish_cell = server_cell.clone();
    router
        .register(
            "publish",
            move |(topic, token, value): (String, Option<String>, Vec<u8>)| {
                let server = publish_cell.get().expect("server not yet started").clone();
                match token {
                    Some(token) => server.publish_by_token(&topic, &token, &value),
                    None => server.publish(&topic, &value),
                }
                Ok::<_, String>(())
            },
        )
        .unwrap();

    let server = Server::new(
        ServerConfig {
            bind_addr: args.bind,
            idle_timeout: Duration::from_secs(args.idle_timeout_secs),
            ..Default::default()
        },
        Arc::new(router),
    );
    server_cell.set(server.clone()).ok();

    let addr = server.clone().serve().await?;
    tracing::info!(%addr, "linkrpc demo server listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    server.stop();

    Ok(())
}
