//! Echo Server - TCP server with a few typed service methods.
//!
//! This example demonstrates:
//! - Registering typed handlers with the builder pattern
//! - Installing a `tracing` subscriber driven by `RUST_LOG`
//! - Serving a TCP listener until interrupted
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=seqwire=debug cargo run --example echo_server -- 127.0.0.1:4000
//! cargo run --example echo_client -- 127.0.0.1:4000
//! ```

use std::time::Duration;

use seqwire::{RpcError, Server};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Input structure for `Echo.Say`.
#[derive(Deserialize, Debug)]
struct EchoInput {
    message: String,
}

/// Output structure for `Echo.Say`.
#[derive(Serialize, Debug)]
struct EchoOutput {
    echo: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "seqwire=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:4000".to_string());

    let server = Server::builder()
        .handle("Echo.Say", |input: EchoInput| async move {
            Ok(EchoOutput {
                echo: input.message,
            })
        })
        .handle("Arith.Div", |(a, b): (i64, i64)| async move {
            if b == 0 {
                return Err(RpcError::handler("divide by zero"));
            }
            Ok(a / b)
        })
        .handle("Clock.Sleep", |millis: u64| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(millis)
        })
        .request_timeout(Duration::from_secs(10))
        .build();

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Listening");

    tokio::select! {
        result = server.serve(listener) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}
