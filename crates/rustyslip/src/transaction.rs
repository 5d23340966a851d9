//! Request/response transactions over a framed byte channel.
//!
//! A [`Transaction`] owns one connection: a byte source, a byte sink and a
//! framer. Transactions are linear within a connection; the caller
//! serializes concurrent use. A [`FrameReader`] can be spawned to drain
//! unsolicited frames from a source the transaction does not own.

use crate::error::TransactionError;
use crate::payload::{pack_payload, parse_payload, Frame, Variant, RESPONSE_FLAG};
use crate::slip::{self, SlipDecoder};
use rustymsg::MessageRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Result of one completed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOutcome {
    /// Frames that arrived before the response, in arrival order
    pub intermediate: Vec<Frame>,
    /// The frame whose pid matched `request | 0x80`
    pub response: Frame,
}

/// One connection's transaction endpoint.
#[derive(Debug)]
pub struct Transaction<R, W> {
    source: R,
    sink: W,
    framer: SlipDecoder,
    variant: Variant,
    registry: Arc<MessageRegistry>,
    seq: u8,
}

impl<R, W> Transaction<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wraps a bidirectional byte channel. The layout variant is fixed
    /// for the lifetime of the connection.
    #[must_use]
    pub fn new(source: R, sink: W, variant: Variant, registry: Arc<MessageRegistry>) -> Self {
        Self {
            source,
            sink,
            framer: SlipDecoder::new(),
            variant,
            registry,
            seq: 0,
        }
    }

    /// Frames and sends one payload.
    pub async fn send(&mut self, pid: u8, data: &[u8]) -> Result<(), TransactionError> {
        let body = pack_payload(self.variant, pid, self.seq, data)?;
        self.seq = self.seq.wrapping_add(1);
        let framed = slip::encode(&body);
        self.sink
            .write_all(&framed)
            .await
            .map_err(|_| TransactionError::ChannelClosed)?;
        self.sink
            .flush()
            .await
            .map_err(|_| TransactionError::ChannelClosed)?;
        log::debug!("sent pid 0x{pid:02X}, {} framed bytes", framed.len());
        Ok(())
    }

    /// Reads the next well-formed frame. Payloads that fail length, CRC
    /// or decode validation are dropped with a warning; the framer
    /// resyncs at the next `END`.
    pub async fn read_frame(&mut self) -> Result<Frame, TransactionError> {
        let mut byte = [0u8; 1];
        loop {
            let n = self
                .source
                .read(&mut byte)
                .await
                .map_err(|_| TransactionError::ChannelClosed)?;
            if n == 0 {
                return Err(TransactionError::ChannelClosed);
            }
            match self.framer.feed(byte[0]) {
                Ok(Some(body)) => match parse_payload(self.variant, &body, &self.registry) {
                    Ok(frame) => return Ok(frame),
                    Err(err) => log::warn!("dropping frame: {err}"),
                },
                Ok(None) => {}
                Err(err) => log::warn!("framer reset: {err}"),
            }
        }
    }

    /// Sends a request and reads frames until its response (`pid | 0x80`)
    /// arrives or the deadline expires. Intermediate frames are returned
    /// in arrival order. On timeout the framer keeps its state and
    /// recovers at the next `END`.
    pub async fn transact(
        &mut self,
        pid: u8,
        data: &[u8],
        deadline: Duration,
    ) -> Result<TransactionOutcome, TransactionError> {
        self.send(pid, data).await?;
        tokio::time::timeout(deadline, self.read_until_response(pid))
            .await
            .map_err(|_| TransactionError::Timeout)?
    }

    async fn read_until_response(
        &mut self,
        pid: u8,
    ) -> Result<TransactionOutcome, TransactionError> {
        let mut intermediate = Vec::new();
        loop {
            let frame = self.read_frame().await?;
            if frame.is_response_to(pid) {
                log::debug!(
                    "transaction 0x{pid:02X} complete after {} intermediate frames",
                    intermediate.len()
                );
                return Ok(TransactionOutcome {
                    intermediate,
                    response: frame,
                });
            }
            intermediate.push(frame);
        }
    }

    /// Splits the endpoint back into its source and sink.
    pub fn into_inner(self) -> (R, W) {
        (self.source, self.sink)
    }
}

/// Drains frames from a byte source, printing each through `log`.
///
/// Mirrors the reader side of a connection: it stops after the frame
/// whose pid matches `stop_on`, or after the first frame when no target
/// is set.
#[derive(Debug)]
pub struct FrameReader<R> {
    source: R,
    framer: SlipDecoder,
    variant: Variant,
    registry: Arc<MessageRegistry>,
    stop_on: Option<u8>,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates a reader over a byte source. `stop_on` is the pid that
    /// terminates the reader, typically `request | 0x80`.
    #[must_use]
    pub fn new(
        source: R,
        variant: Variant,
        registry: Arc<MessageRegistry>,
        stop_on: Option<u8>,
    ) -> Self {
        Self {
            source,
            framer: SlipDecoder::new(),
            variant,
            registry,
            stop_on,
        }
    }

    /// Consumes frames until the stop condition, returning everything
    /// received in arrival order.
    pub async fn run(mut self) -> Result<Vec<Frame>, TransactionError> {
        let mut frames = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self
                .source
                .read(&mut byte)
                .await
                .map_err(|_| TransactionError::ChannelClosed)?;
            if n == 0 {
                return Err(TransactionError::ChannelClosed);
            }
            let payload = match self.framer.feed(byte[0]) {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(err) => {
                    log::warn!("framer reset: {err}");
                    continue;
                }
            };
            match parse_payload(self.variant, &payload, &self.registry) {
                Ok(frame) => {
                    log::info!("received frame:\n{frame}");
                    let done = self.stop_on.is_none_or(|pid| frame.pid == pid);
                    frames.push(frame);
                    if done {
                        return Ok(frames);
                    }
                }
                Err(err) => log::warn!("dropping frame: {err}"),
            }
        }
    }
}

/// Convenience wrapper: the response pid for a request pid.
#[must_use]
pub const fn response_pid(pid: u8) -> u8 {
    pid | RESPONSE_FLAG
}
