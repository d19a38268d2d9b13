//! Dedicated writer task for one connection.
//!
//! Every response on a connection goes through a single task that owns the
//! [`CodecWriter`]. Dispatches hand complete frames to it over an mpsc
//! channel, so a frame is always written whole before the next one starts
//! and concurrently finishing requests never interleave on the wire.
//!
//! # Architecture
//!
//! ```text
//! Dispatch 1 ─┐
//! Dispatch 2 ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► CodecWriter
//! Dispatch N ─┘
//! ```
//!
//! The task exits when every [`WriterHandle`] is dropped (after closing the
//! connection's write side) or on the first write failure (the codec has
//! already closed the connection).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::codec::{Body, CodecType, CodecWriter};
use crate::error::{RpcError, Result};
use crate::protocol::Header;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// A response frame ready to be written.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Response header; `seq` matches the request.
    pub header: Header,
    /// Encoded reply, or the empty sentinel for errors.
    pub body: Body,
}

impl OutboundFrame {
    /// Successful response.
    #[inline]
    pub fn reply(header: Header, body: Body) -> Self {
        Self { header, body }
    }

    /// Error response: the error text goes in the header, the body is the
    /// empty sentinel.
    pub fn error(header: Header, error: &RpcError, codec_type: CodecType) -> Self {
        Self {
            header: header.with_error(error.to_string()),
            body: Body::empty(codec_type),
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable; each dispatch holds its own clone.
#[derive(Clone)]
pub struct WriterHandle {
    /// Channel sender for frames.
    tx: mpsc::Sender<OutboundFrame>,
    /// Frames queued or being written.
    pending: Arc<AtomicUsize>,
}

impl WriterHandle {
    /// Queue a frame for writing.
    ///
    /// Waits while the channel is full. Returns
    /// [`RpcError::ConnectionClosed`] if the writer task has stopped.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(frame).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            RpcError::ConnectionClosed
        })
    }

    /// Number of frames queued or being written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Whether the writer task has stopped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// `channel_capacity` is clamped to `1..=Semaphore::MAX_PERMITS`.
///
/// The `JoinHandle` resolves once the writer has closed the connection's
/// write side, or with the first write error.
pub fn spawn_writer_task(
    writer: CodecWriter,
    channel_capacity: usize,
) -> (WriterHandle, JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::channel(channel_capacity.clamp(1, Semaphore::MAX_PERMITS));
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle {
        tx,
        pending: pending.clone(),
    };
    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

/// Main writer loop - writes frames one at a time in arrival order.
async fn writer_loop(
    mut rx: mpsc::Receiver<OutboundFrame>,
    mut writer: CodecWriter,
    pending: Arc<AtomicUsize>,
) -> Result<()> {
    while let Some(frame) = rx.recv().await {
        let result = writer.write(&frame.header, &frame.body).await;
        pending.fetch_sub(1, Ordering::Release);
        result?;
    }

    // All handles dropped: nothing more will be written.
    writer.close().await
}
