//! Length-prefixed value framing.
//!
//! Every header and every body travels as one value:
//! ```text
//! ┌──────────┬─────────────────────┐
//! │ Length   │ Encoded value       │
//! │ 4 bytes  │ Length bytes        │
//! │ uint32 BE│ (codec-specific)    │
//! └──────────┴─────────────────────┘
//! ```
//!
//! A frame is a header value immediately followed by a body value. Because
//! the length is known up front, a value whose contents fail to decode is
//! still consumed whole and the stream stays aligned on the next frame.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::{RpcError, Result};

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default maximum size of a single encoded value (16 MiB).
pub const DEFAULT_MAX_VALUE_SIZE: usize = 16 * 1024 * 1024;

/// Append a length-prefixed value to `buf`.
///
/// # Errors
///
/// Returns [`RpcError::Encode`] if the value does not fit a `u32` length.
pub fn encode_value_into(buf: &mut BytesMut, value: &[u8]) -> Result<()> {
    let len = u32::try_from(value.len()).map_err(|_| {
        RpcError::Encode(format!("value of {} bytes is too large to frame", value.len()))
    })?;
    buf.reserve(LENGTH_PREFIX_SIZE + value.len());
    buf.put_u32(len);
    buf.put_slice(value);
    Ok(())
}

/// Read one length-prefixed value.
///
/// Returns:
/// - `Ok(Some(bytes))` for a complete value
/// - `Ok(None)` if the stream ended cleanly before the first prefix byte
/// - `Err(Io(UnexpectedEof))` if the stream ended inside a value
/// - `Err(FrameTooLarge)` if the prefix exceeds `max_size`
pub async fn read_value<R>(reader: &mut R, max_size: usize) -> Result<Option<Bytes>>
where
    R: AsyncBufRead + Unpin,
{
    if reader.fill_buf().await?.is_empty() {
        return Ok(None);
    }

    let len = reader.read_u32().await? as usize;
    if len > max_size {
        return Err(RpcError::FrameTooLarge {
            size: len,
            max: max_size,
        });
    }

    let mut value = BytesMut::zeroed(len);
    reader.read_exact(&mut value).await?;
    Ok(Some(value.freeze()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    fn framed(values: &[&[u8]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for value in values {
            encode_value_into(&mut buf, value).unwrap();
        }
        buf.to_vec()
    }

    #[test]
    fn test_encode_prefix_is_big_endian() {
        let bytes = framed(&[b"abc"]);
        assert_eq!(&bytes[..LENGTH_PREFIX_SIZE], &[0, 0, 0, 3]);
        assert_eq!(&bytes[LENGTH_PREFIX_SIZE..], b"abc");
    }

    #[tokio::test]
    async fn test_read_values_in_order() {
        let bytes = framed(&[b"header", b"", b"body"]);
        let mut reader = BufReader::new(&bytes[..]);

        let first = read_value(&mut reader, DEFAULT_MAX_VALUE_SIZE).await.unwrap();
        assert_eq!(first.as_deref(), Some(&b"header"[..]));

        let empty = read_value(&mut reader, DEFAULT_MAX_VALUE_SIZE).await.unwrap();
        assert_eq!(empty.as_deref(), Some(&b""[..]));

        let last = read_value(&mut reader, DEFAULT_MAX_VALUE_SIZE).await.unwrap();
        assert_eq!(last.as_deref(), Some(&b"body"[..]));

        let eof = read_value(&mut reader, DEFAULT_MAX_VALUE_SIZE).await.unwrap();
        assert!(eof.is_none());
    }

    #[tokio::test]
    async fn test_truncated_value_is_io_error() {
        let bytes = framed(&[b"hello world"]);
        let truncated = &bytes[..bytes.len() - 3];
        let mut reader = BufReader::new(truncated);

        let err = read_value(&mut reader, DEFAULT_MAX_VALUE_SIZE)
            .await
            .unwrap_err();
        match err {
            RpcError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_truncated_prefix_is_io_error() {
        let bytes = [0u8, 0];
        let mut reader = BufReader::new(&bytes[..]);

        let err = read_value(&mut reader, DEFAULT_MAX_VALUE_SIZE)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Io(_)));
    }

    #[tokio::test]
    async fn test_oversized_value_rejected() {
        let bytes = framed(&[&[0u8; 32]]);
        let mut reader = BufReader::new(&bytes[..]);

        let err = read_value(&mut reader, 16).await.unwrap_err();
        assert!(matches!(err, RpcError::FrameTooLarge { size: 32, max: 16 }));
    }
}
