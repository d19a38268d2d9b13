//! Control module - per-connection handshake.
//!
//! Before any codec framing, the client sends one [`Options`] record as a
//! single line of JSON. The server validates the magic number, picks the
//! codec named by `codecType` and hands the connection to the request
//! pipeline.
//!
//! # Workflow
//!
//! 1. Client connects
//! 2. Client sends `{"magicNumber":3927900,"codecType":"application/msgpack"}\n`
//! 3. Server validates and selects the codec (or drops the connection)
//! 4. Framed requests and responses follow on the same stream

mod negotiate;
mod options;

pub use negotiate::{negotiate, MAX_OPTIONS_LINE};
pub use options::{Options, MAGIC_NUMBER};
