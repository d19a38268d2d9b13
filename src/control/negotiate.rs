//! Connection negotiation.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::{Options, MAGIC_NUMBER};
use crate::codec::{Codec, CodecRegistry};
use crate::error::{RpcError, Result};
use crate::transport::Connection;

/// Maximum length of the options line, newline included.
pub const MAX_OPTIONS_LINE: usize = 4096;

/// Read the options record from a fresh connection and bind a codec.
///
/// Reads exactly one line and nothing past it. On any failure the
/// connection is consumed and dropped without a byte written back.
///
/// # Errors
///
/// Returns [`RpcError::Negotiation`] for a malformed record, a wrong magic
/// number or an unregistered codec type, and [`RpcError::Io`] if the
/// transport fails while reading.
pub async fn negotiate(registry: &CodecRegistry, mut conn: Connection) -> Result<Codec> {
    let options = read_options(conn.reader_mut()).await?;

    if options.magic_number != MAGIC_NUMBER {
        return Err(RpcError::Negotiation(format!(
            "invalid magic number {:#x}",
            options.magic_number
        )));
    }

    let constructor = registry.lookup(&options.codec_type).ok_or_else(|| {
        RpcError::Negotiation(format!("invalid codec type {:?}", options.codec_type))
    })?;

    tracing::debug!(codec = %options.codec_type, "Negotiated codec");
    Ok(constructor(conn))
}

async fn read_options<R>(reader: &mut R) -> Result<Options>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::with_capacity(128);
    let n = (&mut *reader)
        .take(MAX_OPTIONS_LINE as u64)
        .read_until(b'\n', &mut line)
        .await?;

    if n == 0 {
        return Err(RpcError::Negotiation(
            "connection closed before options record".to_string(),
        ));
    }
    if line.last() != Some(&b'\n') {
        let reason = if n >= MAX_OPTIONS_LINE {
            format!("options record exceeds {} bytes", MAX_OPTIONS_LINE)
        } else {
            "connection closed inside options record".to_string()
        };
        return Err(RpcError::Negotiation(reason));
    }

    serde_json::from_slice(&line)
        .map_err(|e| RpcError::Negotiation(format!("malformed options record: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Body, CodecType};
    use crate::protocol::{encode_value_into, Header};
    use bytes::BytesMut;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    async fn negotiate_with(payload: &[u8], registry: &CodecRegistry) -> Result<Codec> {
        let (mut client, server) = duplex(64 * 1024);
        client.write_all(payload).await.unwrap();
        client.shutdown().await.unwrap();
        negotiate(registry, Connection::new(server, "test")).await
    }

    fn connected() -> (DuplexStream, Connection) {
        let (client, server) = duplex(64 * 1024);
        (client, Connection::new(server, "test"))
    }

    #[tokio::test]
    async fn test_valid_options_select_codec() {
        let registry = CodecRegistry::default();
        for codec_type in CodecType::ALL {
            let line = Options::new(codec_type).to_line().unwrap();
            let codec = negotiate_with(&line, &registry).await.unwrap();
            assert_eq!(codec.codec_type(), codec_type);
        }
    }

    #[tokio::test]
    async fn test_wrong_magic_rejected() {
        let line = b"{\"magicNumber\":1,\"codecType\":\"application/msgpack\"}\n";
        let err = negotiate_with(line, &CodecRegistry::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RpcError::Negotiation(ref m) if m.contains("0x1")));
    }

    #[tokio::test]
    async fn test_unknown_codec_rejected() {
        let line = b"{\"magicNumber\":3927900,\"codecType\":\"application/gob\"}\n";
        let err = negotiate_with(line, &CodecRegistry::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RpcError::Negotiation(_)));
    }

    #[tokio::test]
    async fn test_unregistered_codec_rejected() {
        let mut registry = CodecRegistry::new();
        registry.register(CodecType::MsgPack, Codec::msgpack);

        let line = Options::new(CodecType::Json).to_line().unwrap();
        assert!(negotiate_with(&line, &registry).await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_and_truncated_records_rejected() {
        let registry = CodecRegistry::default();
        for payload in [
            &b""[..],
            b"not json\n",
            b"{\"magicNumber\":3927900}\n",
            b"{\"magicNumber\":3927900,\"codecType\":\"application/msgpack\"}",
        ] {
            let err = negotiate_with(payload, &registry).await.err().unwrap();
            assert!(matches!(err, RpcError::Negotiation(_)), "payload {payload:?}");
        }
    }

    #[tokio::test]
    async fn test_oversized_record_rejected() {
        let payload = vec![b' '; MAX_OPTIONS_LINE + 10];
        let err = negotiate_with(&payload, &CodecRegistry::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RpcError::Negotiation(ref m) if m.contains("exceeds")));
    }

    #[tokio::test]
    async fn test_first_frame_in_same_packet_survives() {
        let (mut client, conn) = connected();

        let mut packet = BytesMut::from(&Options::default().to_line().unwrap()[..]);
        let header = CodecType::MsgPack.encode(&Header::new("Foo.Bar", 1)).unwrap();
        let body = Body::encode(CodecType::MsgPack, &"hello").unwrap();
        encode_value_into(&mut packet, &header).unwrap();
        encode_value_into(&mut packet, body.as_bytes()).unwrap();
        client.write_all(&packet).await.unwrap();

        let mut codec = negotiate(&CodecRegistry::default(), conn).await.unwrap();
        let header = codec.read_header().await.unwrap();
        assert_eq!(header, Header::new("Foo.Bar", 1));
        assert_eq!(codec.read_body().await.unwrap().decode::<String>().unwrap(), "hello");
    }
}
