//! Framed (Header, Body) codec bound to one connection.
//!
//! The codec owns both halves of a [`Connection`]. The request pipeline
//! splits it so the read loop keeps the [`CodecReader`] while the
//! connection's writer task owns the [`CodecWriter`].

use bytes::BytesMut;
use tokio::io::{AsyncWriteExt, BufReader};

use super::{Body, CodecType};
use crate::error::{RpcError, Result};
use crate::protocol::{encode_value_into, read_value, Header, DEFAULT_MAX_VALUE_SIZE};
use crate::transport::{BoxedReader, BoxedWriter, Connection};

/// Message codec for one negotiated wire format.
pub struct Codec {
    reader: CodecReader,
    writer: CodecWriter,
}

impl Codec {
    /// Bind a codec of the given format to a connection.
    pub fn new(conn: Connection, codec_type: CodecType) -> Self {
        let (reader, writer) = conn.into_parts();
        Self {
            reader: CodecReader {
                inner: reader,
                codec_type,
                max_value_size: DEFAULT_MAX_VALUE_SIZE,
            },
            writer: CodecWriter {
                inner: writer,
                codec_type,
                scratch: BytesMut::new(),
                closed: false,
            },
        }
    }

    /// MessagePack codec constructor (registry entry).
    pub fn msgpack(conn: Connection) -> Self {
        Self::new(conn, CodecType::MsgPack)
    }

    /// JSON codec constructor (registry entry).
    pub fn json(conn: Connection) -> Self {
        Self::new(conn, CodecType::Json)
    }

    /// Limit the size of a single incoming value.
    pub fn with_max_value_size(mut self, max_value_size: usize) -> Self {
        self.reader.max_value_size = max_value_size;
        self
    }

    /// Wire format of this codec.
    #[inline]
    pub fn codec_type(&self) -> CodecType {
        self.reader.codec_type
    }

    /// See [`CodecReader::read_header`].
    pub async fn read_header(&mut self) -> Result<Header> {
        self.reader.read_header().await
    }

    /// See [`CodecReader::read_body`].
    pub async fn read_body(&mut self) -> Result<Body> {
        self.reader.read_body().await
    }

    /// See [`CodecWriter::write`].
    pub async fn write(&mut self, header: &Header, body: &Body) -> Result<()> {
        self.writer.write(header, body).await
    }

    /// See [`CodecWriter::close`].
    pub async fn close(&mut self) -> Result<()> {
        self.writer.close().await
    }

    /// Split into independently owned read and write halves.
    pub fn into_split(self) -> (CodecReader, CodecWriter) {
        (self.reader, self.writer)
    }
}

/// Read half of a [`Codec`].
pub struct CodecReader {
    inner: BufReader<BoxedReader>,
    codec_type: CodecType,
    max_value_size: usize,
}

impl CodecReader {
    /// Wire format of this reader.
    #[inline]
    pub fn codec_type(&self) -> CodecType {
        self.codec_type
    }

    /// Read the next header.
    ///
    /// # Errors
    ///
    /// - [`RpcError::EndOfStream`] if the peer closed at a frame boundary
    /// - [`RpcError::Decode`] if the header value is malformed; the value has
    ///   been consumed and the body can still be read
    /// - [`RpcError::Io`] / [`RpcError::FrameTooLarge`] on transport failure
    pub async fn read_header(&mut self) -> Result<Header> {
        match read_value(&mut self.inner, self.max_value_size).await? {
            Some(bytes) => self.codec_type.decode(&bytes),
            None => Err(RpcError::EndOfStream),
        }
    }

    /// Read the body that follows a header.
    ///
    /// The body is returned still encoded; see [`Body::decode`].
    pub async fn read_body(&mut self) -> Result<Body> {
        match read_value(&mut self.inner, self.max_value_size).await? {
            Some(bytes) => Ok(Body::from_bytes(self.codec_type, bytes)),
            None => Err(RpcError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed between header and body",
            ))),
        }
    }
}

/// Write half of a [`Codec`].
pub struct CodecWriter {
    inner: BoxedWriter,
    codec_type: CodecType,
    /// Reused frame buffer.
    scratch: BytesMut,
    closed: bool,
}

impl CodecWriter {
    /// Wire format of this writer.
    #[inline]
    pub fn codec_type(&self) -> CodecType {
        self.codec_type
    }

    /// Whether the writer has been closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write one frame and flush it.
    ///
    /// Header and body are assembled into a single buffer and flushed once,
    /// so the peer never sees a header without its body. Any failure closes
    /// the writer; later calls return [`RpcError::ConnectionClosed`].
    pub async fn write(&mut self, header: &Header, body: &Body) -> Result<()> {
        if self.closed {
            return Err(RpcError::ConnectionClosed);
        }

        let result = self.write_frame(header, body).await;
        if let Err(e) = &result {
            tracing::error!(seq = header.seq, error = %e, "rpc codec: write failed, closing connection");
            let _ = self.close().await;
        }
        result
    }

    async fn write_frame(&mut self, header: &Header, body: &Body) -> Result<()> {
        if body.codec_type() != self.codec_type {
            return Err(RpcError::Encode(format!(
                "body encoded as {} on a {} connection",
                body.codec_type(),
                self.codec_type
            )));
        }

        let header_bytes = self.codec_type.encode(header)?;

        self.scratch.clear();
        encode_value_into(&mut self.scratch, &header_bytes)?;
        encode_value_into(&mut self.scratch, body.as_bytes())?;

        self.inner.write_all(&self.scratch).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shut the connection's write side down. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.shutdown().await?;
        Ok(())
    }
}
