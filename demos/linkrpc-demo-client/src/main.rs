//! Example `linkrpc` client: exercises `call`, `publish`, and `subscribe`
//! against `linkrpc-demo-server`.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use linkrpc::prelude::*;
use linkrpc::Codec;

#[derive(Parser, Debug)]
#[command(about = "Example linkrpc client")]
struct Args {
    #[arg(long, default_value = "127.0.0.1:7700")]
    server: SocketAddr,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Call the server's `add` handler.
    Add { a: i32, b: i32 },
    /// Call the server's `echo` handler.
    Echo { message: String },
    /// Publish a message to a topic via the server's conventional `publish` RPC.
    Publish {
        topic: String,
        message: String,
        #[arg(long)]
        token: Option<String>,
    },
    /// Subscribe to a topic and print whatever arrives for a while.
    Subscribe {
        topic: String,
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let client = Client::new(args.server, ClientConfig::default());
    client.connect().await?;

    match args.command {
        Command::Add { a, b } => {
            let sum: i32 = call!(client, add, (a, b)).await?;
            println!("{a} + {b} = {sum}");
        }
        Command::Echo { message } => {
            let reply: String = call!(client, echo, message).await?;
            println!("echo: {reply}");
        }
        Command::Publish { topic, message, token } => {
            client
                .publish(&topic, token.as_deref(), Codec::pack(&message))
                .await?;
            println!("published to {topic}");
        }
        Command::Subscribe { topic, seconds } => {
            let label = topic.clone();
            client.subscribe::<String, _>(&topic, None, move |message| {
                println!("[{label}] {message}");
            });
            tokio::time::sleep(Duration::from_secs(seconds)).await;
        }
    }

    Ok(())
}
