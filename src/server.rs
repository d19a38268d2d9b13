//! Server builder and accept loop.
//!
//! The [`ServerBuilder`] collects codecs, handlers and limits. The
//! [`Server`] manages each connection's lifecycle:
//! 1. Accept a stream from a [`Listener`]
//! 2. Negotiate the wire format from the options line
//! 3. Run the request pipeline until the peer closes
//!
//! # Example
//!
//! ```ignore
//! use seqwire::Server;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> seqwire::Result<()> {
//!     let server = Server::builder()
//!         .handle("Echo.Say", |text: String| async move { Ok(text) })
//!         .build();
//!
//!     let listener = TcpListener::bind("127.0.0.1:4000").await?;
//!     server.serve(listener).await
//! }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::Instrument;

use crate::codec::{Codec, CodecRegistry, CodecType, NewCodecFn};
use crate::control::negotiate;
use crate::error::Result;
use crate::handler::{HandlerRegistry, RequestHandler};
use crate::pipeline;
use crate::protocol::DEFAULT_MAX_VALUE_SIZE;
use crate::transport::{Connection, Listener};
use crate::writer::DEFAULT_CHANNEL_CAPACITY;

/// Per-connection limits.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Largest header or body value accepted, in bytes.
    pub max_value_size: usize,
    /// Responses buffered for the writer task before dispatches wait.
    pub writer_channel_capacity: usize,
    /// Requests a connection may have running at once. `None` is unbounded.
    pub max_in_flight: Option<usize>,
    /// Deadline for a single handler. `None` waits forever.
    pub request_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            writer_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_in_flight: None,
            request_timeout: None,
        }
    }
}

/// Builder for configuring and creating a [`Server`].
pub struct ServerBuilder {
    codecs: CodecRegistry,
    methods: HandlerRegistry,
    handler: Option<Arc<dyn RequestHandler>>,
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a builder with both wire formats registered and no methods.
    pub fn new() -> Self {
        Self {
            codecs: CodecRegistry::default(),
            methods: HandlerRegistry::new(),
            handler: None,
            config: ServerConfig::default(),
        }
    }

    /// Register a typed handler for a service method.
    pub fn handle<F, T, R, Fut>(mut self, service_method: &str, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        self.methods.register(service_method, handler);
        self
    }

    /// Dispatch every request to `handler` instead of the methods
    /// registered with [`handle`](Self::handle).
    pub fn handler(mut self, handler: impl RequestHandler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Register (or replace) the constructor for a wire format.
    pub fn codec(mut self, codec_type: CodecType, constructor: NewCodecFn) -> Self {
        self.codecs.register(codec_type, constructor);
        self
    }

    /// Replace the whole codec registry.
    pub fn codecs(mut self, codecs: CodecRegistry) -> Self {
        self.codecs = codecs;
        self
    }

    /// Set the largest header or body value accepted.
    ///
    /// Default: 16 MiB
    pub fn max_value_size(mut self, bytes: usize) -> Self {
        self.config.max_value_size = bytes;
        self
    }

    /// Set the writer channel capacity. Clamped to
    /// `1..=Semaphore::MAX_PERMITS` when a connection starts.
    ///
    /// Default: 1024
    pub fn writer_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.writer_channel_capacity = capacity;
        self
    }

    /// Cap the requests running at once on one connection.
    ///
    /// Once the cap is reached the connection stops reading until a request
    /// finishes. Nothing is dropped. Clamped like
    /// [`writer_channel_capacity`](Self::writer_channel_capacity).
    pub fn max_in_flight(mut self, limit: usize) -> Self {
        self.config.max_in_flight = Some(limit);
        self
    }

    /// Answer a request with an error if its handler runs longer than
    /// `timeout`. The handler is abandoned.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Build the server.
    pub fn build(self) -> Server {
        let handler = match self.handler {
            Some(handler) => handler,
            None => {
                tracing::debug!(methods = ?self.methods.method_names(), "Registered service methods");
                Arc::new(self.methods)
            }
        };

        Server {
            inner: Arc::new(Shared {
                codecs: self.codecs,
                handler,
                config: self.config,
            }),
        }
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct Shared {
    codecs: CodecRegistry,
    handler: Arc<dyn RequestHandler>,
    config: ServerConfig,
}

/// An RPC server. Cheap to clone; clones share codecs, handlers and config.
#[derive(Clone)]
pub struct Server {
    inner: Arc<Shared>,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Per-connection limits this server applies.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Accept connections until the listener fails.
    ///
    /// Each connection is served on its own task, so a failing connection
    /// never affects the others or this loop.
    ///
    /// # Errors
    ///
    /// Returns the listener's error; connections already accepted keep
    /// running.
    pub async fn serve<L: Listener>(&self, mut listener: L) -> Result<()> {
        loop {
            let (stream, peer) = match listener.next_connection().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!(error = %e, "rpc server: accept failed");
                    return Err(e.into());
                }
            };

            let server = self.clone();
            tokio::spawn(async move { server.serve_connection(stream, peer).await });
        }
    }

    /// Negotiate and serve one already-accepted stream.
    ///
    /// Resolves once the connection is closed. A stream whose options
    /// record is rejected is closed without a byte written back.
    pub async fn serve_connection<S>(&self, stream: S, peer: impl Into<String>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let conn = Connection::new(stream, peer);
        let span = tracing::info_span!("conn", id = %conn.id(), peer = %conn.peer());

        async move {
            tracing::info!("Connection opened");
            match negotiate(&self.inner.codecs, conn).await {
                Ok(codec) => self.serve_codec(codec).await,
                Err(e) => tracing::warn!(error = %e, "rpc server: negotiation rejected"),
            }
        }
        .instrument(span)
        .await
    }

    /// Serve a connection whose wire format is already bound.
    pub async fn serve_codec(&self, codec: Codec) {
        pipeline::run(codec, self.inner.handler.clone(), &self.inner.config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Body;
    use crate::control::Options;
    use crate::error::RpcError;
    use crate::handler::Call;
    use crate::protocol::Header;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

    fn echo_server() -> Server {
        Server::builder()
            .handle("Echo.Say", |text: String| async move { Ok(text) })
            .build()
    }

    #[test]
    fn test_builder_config() {
        let server = Server::builder()
            .max_value_size(1024)
            .writer_channel_capacity(8)
            .max_in_flight(4)
            .request_timeout(Duration::from_secs(2))
            .build();

        let config = server.config();
        assert_eq!(config.max_value_size, 1024);
        assert_eq!(config.writer_channel_capacity, 8);
        assert_eq!(config.max_in_flight, Some(4));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_value_size, DEFAULT_MAX_VALUE_SIZE);
        assert!(config.max_in_flight.is_none());
        assert!(config.request_timeout.is_none());
    }

    #[tokio::test]
    async fn test_serve_connection_round_trip() {
        let server = echo_server();
        let (mut client, stream) = duplex(64 * 1024);
        let task = tokio::spawn(async move { server.serve_connection(stream, "mem").await });

        Options::default().send(&mut client).await.unwrap();
        let mut codec = Codec::msgpack(Connection::new(client, "client"));
        let body = Body::encode(CodecType::MsgPack, &"hi").unwrap();
        codec.write(&Header::new("Echo.Say", 1), &body).await.unwrap();

        let header = codec.read_header().await.unwrap();
        assert_eq!(header, Header::new("Echo.Say", 1));
        assert_eq!(codec.read_body().await.unwrap().decode::<String>().unwrap(), "hi");

        codec.close().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_negotiation_writes_nothing() {
        let server = echo_server();
        let (mut client, stream) = duplex(64 * 1024);
        let task = tokio::spawn(async move { server.serve_connection(stream, "mem").await });

        client
            .write_all(b"{\"magicNumber\":1,\"codecType\":\"application/msgpack\"}\n")
            .await
            .unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unregistered_codec_rejected() {
        let mut codecs = CodecRegistry::new();
        codecs.register(CodecType::Json, Codec::json);
        let server = Server::builder().codecs(codecs).build();

        let (mut client, stream) = duplex(64 * 1024);
        let task = tokio::spawn(async move { server.serve_connection(stream, "mem").await });

        Options::new(CodecType::MsgPack).send(&mut client).await.unwrap();

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_custom_request_handler() {
        let server = Server::builder()
            .handle("Ignored.Method", |_: ()| async move { Ok(()) })
            .handler(|method: &str, argument: Body| -> Result<Call> {
                let method = method.to_string();
                let codec_type = argument.codec_type();
                Ok(Box::pin(async move { Body::encode(codec_type, &method) }))
            })
            .build();

        let (mut client, stream) = duplex(64 * 1024);
        tokio::spawn(async move { server.serve_connection(stream, "mem").await });

        Options::new(CodecType::Json).send(&mut client).await.unwrap();
        let mut codec = Codec::json(Connection::new(client, "client"));
        codec
            .write(&Header::new("Any.Method", 3), &Body::empty(CodecType::Json))
            .await
            .unwrap();

        let header = codec.read_header().await.unwrap();
        assert_eq!(header.seq, 3);
        assert_eq!(
            codec.read_body().await.unwrap().decode::<String>().unwrap(),
            "Any.Method"
        );
    }

    struct FailingListener;

    impl Listener for FailingListener {
        type Stream = tokio::io::DuplexStream;

        async fn next_connection(&mut self) -> std::io::Result<(Self::Stream, String)> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "listener gone"))
        }
    }

    #[tokio::test]
    async fn test_accept_failure_ends_serve() {
        let err = echo_server().serve(FailingListener).await.unwrap_err();
        assert!(matches!(err, RpcError::Io(_)));
    }
}
