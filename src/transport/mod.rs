//! Transport module - listeners and connections.
//!
//! Provides:
//! - [`Listener`] - source of accepted byte streams for the accept loop
//! - [`Connection`] - one accepted stream, split into buffered read and write halves
//! - TCP (`tokio::net::TcpListener`) and Unix domain socket listeners

mod connection;
#[cfg(unix)]
mod unix;

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

pub use connection::{BoxedReader, BoxedWriter, Connection, ConnectionId};
#[cfg(unix)]
pub use unix::{generate_socket_path, UnixSocketListener};

/// A bound listener the server accepts connections from.
pub trait Listener: Send + 'static {
    /// Accepted stream type.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    /// Wait for the next connection, returning the stream and a printable
    /// peer address.
    fn next_connection(&mut self) -> impl Future<Output = io::Result<(Self::Stream, String)>> + Send;
}

impl Listener for TcpListener {
    type Stream = TcpStream;

    async fn next_connection(&mut self) -> io::Result<(TcpStream, String)> {
        let (stream, addr) = self.accept().await?;
        Ok((stream, addr.to_string()))
    }
}
