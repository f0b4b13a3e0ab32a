use async_trait::async_trait;
use log::{debug, error};
use meshwork_lib::frame::{Frame, FrameError};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{timeout, timeout_at, Instant};

#[derive(Debug, Error)]
pub enum TransportError {
    /// No complete frame arrived before the deadline.
    #[error("receive timed out")]
    Timeout,

    #[error("transport closed by peer")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("framing error: {0}")]
    Frame(#[from] FrameError),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout)
    }
}

/// Byte transport to the radio controller.
///
/// `receive` must return within `timeout`, either with a frame or with an
/// error; it never blocks indefinitely.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, frame: &Frame) -> Result<(), TransportError>;

    async fn receive(&self, timeout: Duration) -> Result<Frame, TransportError>;
}

const READ_CHUNK_SIZE: usize = 256;

struct FrameReader<R> {
    inner: R,
    // Bytes read but not yet consumed as a frame. Survives timeouts so a frame
    // split across reads is never lost.
    buffer: Vec<u8>,
}

/// Frame transport over any async byte stream, typically a TCP connection
/// to a serial bridge or to a node simulator.
pub struct StreamTransport<R, W> {
    reader: Mutex<FrameReader<R>>,
    writer: Mutex<W>,
}

impl StreamTransport<OwnedReadHalf, OwnedWriteHalf> {
    pub async fn connect(
        address: &str,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        debug!(
            "Attempting to connect to {} with timeout {:?}",
            address, connect_timeout
        );
        let stream = match timeout(connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => {
                debug!("Successfully connected to {}", address);
                stream
            }
            Ok(Err(e)) => {
                error!("Failed to connect to {}: {}", address, e);
                return Err(e.into());
            }
            Err(_) => {
                error!(
                    "Connection to {} timed out after {:?}",
                    address, connect_timeout
                );
                return Err(TransportError::Timeout);
            }
        };
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self::new(reader, writer))
    }
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(FrameReader {
                inner: reader,
                buffer: Vec::new(),
            }),
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        let bytes = frame.to_bytes()?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn receive(&self, wait: Duration) -> Result<Frame, TransportError> {
        let deadline = Instant::now() + wait;
        let mut guard = self.reader.lock().await;
        let state = &mut *guard;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match Frame::parse(&state.buffer) {
                Ok(Some((frame, consumed))) => {
                    state.buffer.drain(..consumed);
                    return Ok(frame);
                }
                Ok(None) => {}
                Err(e) => {
                    // Skip the offending length byte to resynchronise on the next frame
                    state.buffer.remove(0);
                    return Err(e.into());
                }
            }

            match timeout_at(deadline, state.inner.read(&mut chunk)).await {
                Ok(Ok(0)) => return Err(TransportError::Closed),
                Ok(Ok(n)) => state
                    .buffer
                    .extend_from_slice(chunk.get(..n).unwrap_or_default()),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(TransportError::Timeout),
            }
        }
    }
}
