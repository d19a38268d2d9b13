//! # seqwire
//!
//! Server side of a length-prefixed, sequence-numbered RPC protocol over
//! any byte stream.
//!
//! A client opens a connection and sends one JSON options line naming the
//! wire format. Every frame after that is a header value followed by a body
//! value, each prefixed with its big-endian `u32` length. Requests are read
//! in order and dispatched concurrently; each response carries the `seq` of
//! its request and may arrive in any order.
//!
//! ## Architecture
//!
//! - **Control** ([`control`]): options-line negotiation binding a codec
//! - **Codec** ([`codec`]): msgpack or JSON values in length-prefixed frames
//! - **Handlers** ([`handler`]): static map of service method to typed async function
//! - **Server** ([`Server`]): accept loop, per-connection read loop and writer task
//!
//! ## Example
//!
//! ```ignore
//! use seqwire::Server;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> seqwire::Result<()> {
//!     let server = Server::builder()
//!         .handle("Arith.Add", |(a, b): (i64, i64)| async move { Ok(a + b) })
//!         .build();
//!
//!     server.serve(TcpListener::bind("127.0.0.1:4000").await?).await
//! }
//! ```

pub mod codec;
pub mod control;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod transport;
pub mod writer;

mod pipeline;
mod server;

pub use codec::{Body, Codec, CodecRegistry, CodecType};
pub use error::{Result, RpcError};
pub use handler::{Call, HandlerRegistry, RequestHandler};
pub use protocol::Header;
pub use server::{Server, ServerBuilder, ServerConfig};
