//! Codec module - wire formats and the framed message codec.
//!
//! - [`CodecType`] - closed set of wire-format identifiers negotiated per connection
//! - [`MsgPackCodec`] / [`JsonCodec`] - value serialization for each format
//! - [`Body`] - an encoded payload, decoded on demand into a typed target
//! - [`Codec`] - reads and writes (Header, Body) frames on one connection
//! - [`CodecRegistry`] - maps identifiers to codec constructors
//!
//! # Example
//!
//! ```
//! use seqwire::codec::{Body, CodecType};
//!
//! let body = Body::encode(CodecType::MsgPack, &"hello").unwrap();
//! let decoded: String = body.decode().unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod framed;
mod json;
mod msgpack;
mod registry;

use std::fmt;

use bytes::Bytes;

use crate::error::Result;

pub use framed::{Codec, CodecReader, CodecWriter};
pub use json::JsonCodec;
pub use msgpack::MsgPackCodec;
pub use registry::{CodecRegistry, NewCodecFn};

/// Wire-format identifier sent in the options record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    /// `application/msgpack`
    MsgPack,
    /// `application/json`
    Json,
}

impl CodecType {
    /// Every built-in wire format.
    pub const ALL: [CodecType; 2] = [CodecType::MsgPack, CodecType::Json];

    /// Identifier as sent on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            CodecType::MsgPack => "application/msgpack",
            CodecType::Json => "application/json",
        }
    }

    /// Parse a wire identifier. Unknown identifiers yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Encode a value in this format.
    pub fn encode<T: serde::Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            CodecType::MsgPack => MsgPackCodec::encode(value),
            CodecType::Json => JsonCodec::encode(value),
        }
    }

    /// Decode a value in this format.
    pub fn decode<T: serde::de::DeserializeOwned>(self, bytes: &[u8]) -> Result<T> {
        match self {
            CodecType::MsgPack => MsgPackCodec::decode(bytes),
            CodecType::Json => JsonCodec::decode(bytes),
        }
    }

    /// Encoded unit value, used as the body of error responses.
    fn empty_body(self) -> &'static [u8] {
        match self {
            CodecType::MsgPack => &[0xc0],
            CodecType::Json => b"null",
        }
    }
}

impl fmt::Display for CodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An encoded payload together with the format it was encoded in.
///
/// The transport never looks inside a body. Request handlers decode it into
/// whatever argument type the service method expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    codec_type: CodecType,
    bytes: Bytes,
}

impl Body {
    /// Encode `value` as a body.
    pub fn encode<T: serde::Serialize + ?Sized>(codec_type: CodecType, value: &T) -> Result<Self> {
        let bytes = codec_type.encode(value)?;
        Ok(Self {
            codec_type,
            bytes: Bytes::from(bytes),
        })
    }

    /// The sentinel body sent with error responses.
    pub fn empty(codec_type: CodecType) -> Self {
        Self {
            codec_type,
            bytes: Bytes::from_static(codec_type.empty_body()),
        }
    }

    /// Wrap already-encoded bytes.
    pub fn from_bytes(codec_type: CodecType, bytes: impl Into<Bytes>) -> Self {
        Self {
            codec_type,
            bytes: bytes.into(),
        }
    }

    /// Decode into the target type.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Decode`](crate::RpcError::Decode) if the payload
    /// does not describe a `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        self.codec_type.decode(&self.bytes)
    }

    /// Format this body is encoded in.
    #[inline]
    pub fn codec_type(&self) -> CodecType {
        self.codec_type
    }

    /// Raw encoded bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;

    #[test]
    fn test_codec_type_names() {
        for codec_type in CodecType::ALL {
            assert_eq!(CodecType::from_name(codec_type.as_str()), Some(codec_type));
        }
        assert_eq!(CodecType::from_name("application/gob"), None);
        assert_eq!(CodecType::from_name(""), None);
    }

    #[test]
    fn test_empty_body_decodes_as_unit_and_none() {
        for codec_type in CodecType::ALL {
            let body = Body::empty(codec_type);
            body.decode::<()>().unwrap();
            assert_eq!(body.decode::<Option<String>>().unwrap(), None);
        }
    }

    #[test]
    fn test_body_decode_uses_its_own_format() {
        let json = Body::encode(CodecType::Json, &[1, 2, 3]).unwrap();
        assert_eq!(json.as_bytes(), b"[1,2,3]");
        assert_eq!(json.decode::<Vec<u8>>().unwrap(), vec![1, 2, 3]);

        let msgpack = Body::encode(CodecType::MsgPack, &[1, 2, 3]).unwrap();
        assert_eq!(msgpack.as_bytes()[0], 0x93);
        assert_eq!(msgpack.decode::<Vec<u8>>().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_body_shape_mismatch() {
        let body = Body::encode(CodecType::Json, &"text").unwrap();
        assert!(matches!(body.decode::<i32>(), Err(RpcError::Decode(_))));
    }
}
