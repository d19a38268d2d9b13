//! Echo Client - talks to `echo_server` using the raw framing.
//!
//! This example demonstrates:
//! - Sending the options line to pick a wire format
//! - Pipelining several requests before reading any response
//! - Matching out-of-order responses by `seq`
//!
//! # Running
//!
//! ```sh
//! cargo run --example echo_server -- 127.0.0.1:4000
//! cargo run --example echo_client -- 127.0.0.1:4000 json
//! ```

use std::collections::HashMap;

use seqwire::control::Options;
use seqwire::transport::Connection;
use seqwire::{Body, Codec, CodecType, Header};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

#[derive(Serialize)]
struct EchoInput<'a> {
    message: &'a str,
}

#[derive(Deserialize, Debug)]
struct EchoOutput {
    echo: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:4000".to_string());
    let codec_type = match args.next().as_deref() {
        Some("json") => CodecType::Json,
        _ => CodecType::MsgPack,
    };

    let mut stream = TcpStream::connect(&addr).await?;
    Options::new(codec_type).send(&mut stream).await?;
    let mut codec = Codec::new(Connection::new(stream, addr), codec_type);

    let mut pending = HashMap::new();
    let requests = [
        ("Clock.Sleep", Body::encode(codec_type, &200u64)?),
        ("Echo.Say", Body::encode(codec_type, &EchoInput { message: "hello" })?),
        ("Arith.Div", Body::encode(codec_type, &(7i64, 0i64))?),
        ("Arith.Div", Body::encode(codec_type, &(84i64, 2i64))?),
    ];
    for (seq, (method, body)) in requests.iter().enumerate() {
        let seq = seq as u64 + 1;
        codec.write(&Header::new(*method, seq), body).await?;
        pending.insert(seq, *method);
    }

    while !pending.is_empty() {
        let header = codec.read_header().await?;
        let body = codec.read_body().await?;
        let method = pending.remove(&header.seq).unwrap_or("?");

        if let Some(error) = &header.error {
            println!("#{} {} -> error: {}", header.seq, method, error);
            continue;
        }
        match method {
            "Echo.Say" => println!("#{} {} -> {:?}", header.seq, method, body.decode::<EchoOutput>()?),
            "Arith.Div" => println!("#{} {} -> {}", header.seq, method, body.decode::<i64>()?),
            _ => println!("#{} {} -> {}", header.seq, method, body.decode::<u64>()?),
        }
    }

    codec.close().await?;
    Ok(())
}
