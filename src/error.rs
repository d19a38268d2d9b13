//! Error types for seqwire.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all seqwire operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error on the underlying connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The options record was malformed, carried the wrong magic number
    /// or named a codec that is not registered.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// A header or body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A header or body could not be encoded.
    #[error("encode error: {0}")]
    Encode(String),

    /// The peer closed the connection at a frame boundary.
    #[error("end of stream")]
    EndOfStream,

    /// A length prefix announced a value larger than allowed.
    #[error("value size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Announced size.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Business-logic failure reported by a request handler.
    #[error("{0}")]
    Handler(String),

    /// No handler is registered for the service method.
    #[error("can't find service method {0:?}")]
    HandlerNotFound(String),

    /// The handler did not complete within the request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection's writer has shut down.
    #[error("connection closed")]
    ConnectionClosed,
}

impl RpcError {
    /// Create a handler error from any displayable message.
    pub fn handler(message: impl std::fmt::Display) -> Self {
        Self::Handler(message.to_string())
    }

    /// Whether the error is scoped to a single request.
    ///
    /// Recoverable errors are answered with an error response and the
    /// connection keeps serving; everything else tears the connection down.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Decode(_)
                | Self::Encode(_)
                | Self::Handler(_)
                | Self::HandlerNotFound(_)
                | Self::Timeout(_)
        )
    }
}

impl From<rmp_serde::encode::Error> for RpcError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Encode(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for RpcError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
