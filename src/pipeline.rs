//! Per-connection request pipeline.
//!
//! Lifecycle after negotiation:
//! 1. Split the codec; the read half stays here, the write half goes to the
//!    connection's writer task
//! 2. Read frames strictly in order, spawning one dispatch per request
//!    without waiting for it
//! 3. Each dispatch hands exactly one response to the writer task
//! 4. On EOF or a fatal read error, wait for every in-flight dispatch, then
//!    let the writer drain and close the connection
//!
//! A malformed frame only costs its own error response; the loop keeps
//! reading. A failed write stops the loop, since the stream may be corrupt.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};

use crate::codec::{Body, Codec, CodecReader, CodecType};
use crate::error::{RpcError, Result};
use crate::handler::{Call, RequestHandler};
use crate::protocol::Header;
use crate::server::ServerConfig;
use crate::writer::{spawn_writer_task, OutboundFrame, WriterHandle};

/// Outcome of reading one frame.
enum ReadOutcome {
    /// A complete request.
    Request(Header, Body),
    /// The frame was consumed but its header could not be decoded.
    Malformed(RpcError),
    /// The peer closed the stream at a frame boundary.
    EndOfStream,
}

/// Serve one negotiated connection until the peer closes it or the
/// transport fails. Never returns an error: everything that goes wrong here
/// is scoped to this connection and logged.
pub(crate) async fn run(codec: Codec, handler: Arc<dyn RequestHandler>, config: &ServerConfig) {
    let codec_type = codec.codec_type();
    let (mut reader, writer) = codec
        .with_max_value_size(config.max_value_size)
        .into_split();
    let (writer, mut writer_task) = spawn_writer_task(writer, config.writer_channel_capacity);

    let limiter = config
        .max_in_flight
        .map(|limit| Arc::new(Semaphore::new(limit.clamp(1, Semaphore::MAX_PERMITS))));
    let mut in_flight = JoinSet::new();
    let mut writer_result = None;

    loop {
        let permit = match &limiter {
            Some(limiter) => match limiter.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => break,
            },
            None => None,
        };

        let outcome = tokio::select! {
            biased;
            result = &mut writer_task => {
                writer_result = Some(result);
                break;
            }
            outcome = read_frame(&mut reader) => outcome,
        };

        match outcome {
            Ok(ReadOutcome::Request(header, body)) => {
                match handler.handle(&header.service_method, body) {
                    Ok(call) => {
                        tracing::debug!(
                            seq = header.seq,
                            method = %header.service_method,
                            "Dispatching request"
                        );
                        in_flight.spawn(dispatch(
                            header,
                            call,
                            writer.clone(),
                            codec_type,
                            config.request_timeout,
                            permit,
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(
                            seq = header.seq,
                            method = %header.service_method,
                            error = %e,
                            "rpc server: rejecting request"
                        );
                        respond(&writer, OutboundFrame::error(header, &e, codec_type)).await;
                    }
                }
            }
            Ok(ReadOutcome::Malformed(e)) => {
                tracing::warn!(error = %e, "rpc server: malformed request header");
                respond(&writer, OutboundFrame::error(Header::default(), &e, codec_type)).await;
            }
            Ok(ReadOutcome::EndOfStream) => {
                tracing::debug!("Peer closed the connection");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "rpc server: read failed");
                break;
            }
        }

        while let Some(joined) = in_flight.try_join_next() {
            log_join_failure(joined);
        }
    }

    // Responses of in-flight requests are never dropped.
    tracing::debug!(
        in_flight = in_flight.len(),
        queued = writer.pending_count(),
        "Draining connection"
    );
    while let Some(joined) = in_flight.join_next().await {
        log_join_failure(joined);
    }

    drop(writer);
    let result = match writer_result {
        Some(result) => result,
        None => writer_task.await,
    };
    match result {
        Ok(Ok(())) => tracing::info!("Connection closed"),
        Ok(Err(e)) => tracing::error!(error = %e, "Connection closed after write failure"),
        Err(e) => tracing::error!(error = %e, "Writer task failed"),
    }
}

/// Read one frame.
///
/// The body is read even when the header is malformed, so the stream stays
/// aligned on the next frame.
async fn read_frame(reader: &mut CodecReader) -> Result<ReadOutcome> {
    let header = match reader.read_header().await {
        Ok(header) => Ok(header),
        Err(RpcError::EndOfStream) => return Ok(ReadOutcome::EndOfStream),
        Err(e) if e.is_recoverable() => Err(e),
        Err(e) => return Err(e),
    };
    let body = reader.read_body().await?;

    Ok(match header {
        Ok(header) => ReadOutcome::Request(header, body),
        Err(e) => ReadOutcome::Malformed(e),
    })
}

/// Run one call to completion and queue its response.
async fn dispatch(
    header: Header,
    call: Call,
    writer: WriterHandle,
    codec_type: CodecType,
    timeout: Option<Duration>,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let seq = header.seq;

    // The call runs in its own task so a panicking handler still gets a
    // response and a timed-out one can be abandoned.
    let mut task = tokio::spawn(call);
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                task.abort();
                Ok(Err(RpcError::Timeout(limit)))
            }
        },
        None => task.await,
    };

    let frame = match outcome {
        Ok(Ok(body)) if body.codec_type() == codec_type => OutboundFrame::reply(header, body),
        Ok(Ok(body)) => {
            let e = RpcError::Encode(format!(
                "handler replied in {} on a {} connection",
                body.codec_type(),
                codec_type
            ));
            OutboundFrame::error(header, &e, codec_type)
        }
        Ok(Err(e)) => {
            tracing::debug!(seq, error = %e, "Request failed");
            OutboundFrame::error(header, &e, codec_type)
        }
        Err(e) => {
            tracing::error!(seq, error = %e, "rpc server: handler panicked");
            OutboundFrame::error(header, &RpcError::handler("handler panicked"), codec_type)
        }
    };

    respond(&writer, frame).await;
}

async fn respond(writer: &WriterHandle, frame: OutboundFrame) {
    let seq = frame.header.seq;
    if let Err(e) = writer.send(frame).await {
        tracing::warn!(seq, error = %e, "rpc server: response dropped");
    }
}

fn log_join_failure(joined: std::result::Result<(), JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Dispatch task failed");
    }
}
