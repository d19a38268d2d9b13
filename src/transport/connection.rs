//! Accepted connection and its identity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Boxed read half of a connection.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of a connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Read buffer size for connections.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Process-wide counter; relaxed ordering is enough for uniqueness.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection, used in log spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn next() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A bidirectional byte stream owned by exactly one request pipeline.
///
/// The read half is buffered: the options line and the codec frames that
/// follow it are read through the same buffer, so nothing read ahead during
/// negotiation is lost.
pub struct Connection {
    id: ConnectionId,
    peer: String,
    reader: BufReader<BoxedReader>,
    writer: BoxedWriter,
}

impl Connection {
    /// Wrap an accepted stream.
    pub fn new<S>(stream: S, peer: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            id: ConnectionId::next(),
            peer: peer.into(),
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, Box::new(read_half)),
            writer: Box::new(write_half),
        }
    }

    /// This connection's ID.
    #[inline]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Peer address as reported by the listener.
    #[inline]
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Buffered read half.
    pub(crate) fn reader_mut(&mut self) -> &mut BufReader<BoxedReader> {
        &mut self.reader
    }

    /// Consume into the buffered read half and the write half.
    pub fn into_parts(self) -> (BufReader<BoxedReader>, BoxedWriter) {
        (self.reader, self.writer)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_connection_ids_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
        assert!(a.to_string().starts_with("conn-"));
    }

    #[tokio::test]
    async fn test_parts_carry_both_directions() {
        let (local, mut remote) = duplex(256);
        let conn = Connection::new(local, "peer-1");
        assert_eq!(conn.peer(), "peer-1");

        let (mut reader, mut writer) = conn.into_parts();

        remote.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        writer.write_all(b"pong").await.unwrap();
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");
    }
}
