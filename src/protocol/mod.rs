//! Protocol module - message header and value framing.
//!
//! This module implements the framing shared by every codec:
//! - [`Header`] carried in front of each request and response body
//! - Length-prefixed values (`u32` BE length + encoded bytes)

mod header;
mod wire_format;

pub use header::Header;
pub use wire_format::{
    encode_value_into, read_value, DEFAULT_MAX_VALUE_SIZE, LENGTH_PREFIX_SIZE,
};
