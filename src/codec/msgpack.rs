//! MessagePack wire format using `rmp-serde`.
//!
//! Structs are written with `to_vec_named` (struct-as-map), so a header
//! decodes by field name and a peer may add or reorder fields without
//! breaking older servers.

use crate::error::Result;

/// MessagePack wire format.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MessagePack bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Encode`](crate::RpcError::Encode) if the value
    /// cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MessagePack bytes into a value.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Decode`](crate::RpcError::Decode) if the bytes do
    /// not describe a `T`.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
