use log::debug;
use meshwork_lib::frame::Frame;
use meshwork_lib::messages::{CodecError, ProtocolMessage};
use meshwork_lib::{seq_precedes, Seq};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::transport::{Transport, TransportError};

/// Hard cap on transport reads per drain or per correlation.
pub const MAX_READ_COUNT_PER_CALL: usize = 100;

/// Low timeout used while draining, so only already-buffered frames are read.
pub const DRAIN_READ_TIMEOUT: Duration = Duration::from_millis(10);

const COMPONENT: &str = "Dispatcher";

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("failed to encode {message}: {source}")]
    Encode {
        message: &'static str,
        source: CodecError,
    },

    #[error("failed to send seq {seq}: {source}")]
    Send { seq: Seq, source: TransportError },

    #[error("no response for seq {seq} after {reads} reads")]
    NoResponse { seq: Seq, reads: usize },

    #[error("failed to decode response for seq {seq}: {source}")]
    Decode { seq: Seq, source: CodecError },
}

/// Counters kept by one dispatcher over its lifetime.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchMetrics {
    pub exchanges: u64,
    pub responses: u64,
    pub no_responses: u64,
    /// Frames read while waiting for a response that did not match its seq.
    pub unexpected_frames: u64,
    pub drained_frames: u64,
    pub read_timeouts: u64,
    pub read_errors: u64,
}

/// Discard every frame already buffered by the transport.
///
/// Stops at the first timeout or after [`MAX_READ_COUNT_PER_CALL`] reads and
/// returns the number of frames discarded.
pub async fn drain<T: Transport + ?Sized>(transport: &T) -> usize {
    let mut discarded = 0;
    for _ in 0..MAX_READ_COUNT_PER_CALL {
        match transport.receive(DRAIN_READ_TIMEOUT).await {
            Ok(frame) => {
                debug!("[{}] Drained {}", COMPONENT, frame);
                discarded += 1;
            }
            Err(TransportError::Timeout) => break,
            Err(e) => debug!("[{}] Drain read error: {}", COMPONENT, e),
        }
    }
    discarded
}

/// Exchange engine: sends one request at a time and correlates the response
/// by sequence number.
pub struct Dispatcher<T: Transport> {
    transport: Arc<T>,
    read_timeout: Duration,
    seq: Seq,
    metrics: DispatchMetrics,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: Arc<T>, read_timeout: Duration) -> Self {
        Self {
            transport,
            read_timeout,
            seq: 0,
            metrics: DispatchMetrics::default(),
        }
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    /// Sequence number of the most recent exchange, 0 before the first one.
    pub fn last_seq(&self) -> Seq {
        self.seq
    }

    pub fn next_seq(&mut self) -> Seq {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    pub async fn drain(&mut self) -> usize {
        let discarded = drain(self.transport.as_ref()).await;
        self.metrics.drained_frames += discarded as u64;
        discarded
    }

    /// Perform one request/response exchange.
    ///
    /// The request gets the next sequence number, buffered frames are
    /// drained, the request is sent, and frames are read until one carries
    /// the same sequence number or the read timeout elapses.
    pub async fn exchange(
        &mut self,
        message: ProtocolMessage,
    ) -> Result<ProtocolMessage, ExchangeError> {
        let seq = self.next_seq();
        self.metrics.exchanges += 1;

        self.drain().await;
        self.send_message(seq, &message).await?;

        debug!(
            "[{}] Receiving seq {} with timeout {:?}",
            COMPONENT, seq, self.read_timeout
        );
        let (frame, reads) = self.read_until(seq).await;
        let Some(frame) = frame else {
            self.metrics.no_responses += 1;
            log_warn!(COMPONENT, "No response to {} (seq {})", message.name(), seq);
            return Err(ExchangeError::NoResponse { seq, reads });
        };

        debug!("[{}] Received {}", COMPONENT, frame);
        let response =
            ProtocolMessage::decode(&frame).map_err(|source| ExchangeError::Decode { seq, source })?;
        self.metrics.responses += 1;
        log_info!(COMPONENT, "Response to seq {}: {}", seq, response);
        Ok(response)
    }

    async fn send_message(&mut self, seq: Seq, message: &ProtocolMessage) -> Result<(), ExchangeError> {
        let frame = message.encode(seq).map_err(|source| ExchangeError::Encode {
            message: message.name(),
            source,
        })?;
        log_info!(COMPONENT, "Sending seq {}: {}", seq, message);
        debug!("[{}] Sending {}", COMPONENT, frame);
        self.transport.send(&frame).await.map_err(|source| {
            log_error!(COMPONENT, "Failed to send seq {}: {}", seq, source);
            ExchangeError::Send { seq, source }
        })
    }

    // Reads until a frame with `seq` arrives, the read cap is hit or the read
    // timeout has elapsed. Returns the matching frame and the number of reads.
    async fn read_until(&mut self, seq: Seq) -> (Option<Frame>, usize) {
        let start = Instant::now();
        let mut reads = 0;
        while reads < MAX_READ_COUNT_PER_CALL {
            reads += 1;
            let remaining = self.read_timeout.saturating_sub(start.elapsed());
            match self.transport.receive(remaining).await {
                Ok(frame) if frame.seq == seq => return (Some(frame), reads),
                Ok(frame) => self.log_unexpected(seq, &frame),
                Err(TransportError::Timeout) => {
                    self.metrics.read_timeouts += 1;
                    debug!("[{}] Transport timeout waiting for seq {}", COMPONENT, seq);
                }
                Err(e) => {
                    self.metrics.read_errors += 1;
                    log_error!(COMPONENT, "Read error waiting for seq {}: {}", seq, e);
                }
            }
            // Checked after the read so at least one read happens even with a zero timeout
            if start.elapsed() >= self.read_timeout {
                break;
            }
        }
        (None, reads)
    }

    fn log_unexpected(&mut self, expected: Seq, frame: &Frame) {
        self.metrics.unexpected_frames += 1;
        let kind = if seq_precedes(frame.seq, expected) {
            "stale"
        } else {
            "foreign"
        };
        match ProtocolMessage::decode(frame) {
            Ok(message) => log_warn!(
                COMPONENT,
                "<Unexpected message> {} seq {} (expected {}): {}",
                kind,
                frame.seq,
                expected,
                message
            ),
            Err(e) => log_warn!(
                COMPONENT,
                "<Unexpected message> {} seq {} (expected {}), undecodable {}: {}",
                kind,
                frame.seq,
                expected,
                frame,
                e
            ),
        }
    }
}
