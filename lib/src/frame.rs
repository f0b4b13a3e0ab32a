//! Raw frame serialization and parsing.
//!
//! A frame is the unit exchanged with the radio controller:
//!
//! ```text
//! +--------+--------+--------+-----------------------+
//! | len    | seq    | code   | payload (len-1 bytes) |
//! +--------+--------+--------+-----------------------+
//! ```
//!
//! `len` counts the code byte plus the payload, so a message without payload
//! is sent with `len = 1`.

use std::fmt;

use thiserror::Error;

use crate::Seq;

/// Size of the `len` and `seq` prefix that precedes the counted bytes.
pub const FRAME_PREFIX_SIZE: usize = 2;

/// Largest payload a frame can carry (`len` is a single byte and includes the code).
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// A frame must carry at least its code byte.
    #[error("invalid frame length 0")]
    ZeroLength,

    #[error("payload of {len} bytes exceeds maximum {max}")]
    PayloadTooLong { len: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub seq: Seq,
    pub code: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(seq: Seq, code: u8, payload: Vec<u8>) -> Self {
        Self { seq, code, payload }
    }

    /// Value of the `len` header field for this frame.
    pub fn len_field(&self) -> usize {
        self.payload.len() + 1
    }

    /// Serialize the frame into bytes ready for the transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        if self.payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLong {
                len: self.payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        let mut out = Vec::with_capacity(FRAME_PREFIX_SIZE + self.len_field());
        out.push(self.len_field() as u8);
        out.push(self.seq);
        out.push(self.code);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Try to parse one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` when `buf` does not yet hold a complete frame, and
    /// `Ok(Some((frame, consumed)))` otherwise. Bytes past `consumed` belong
    /// to the next frame.
    pub fn parse(buf: &[u8]) -> Result<Option<(Frame, usize)>, FrameError> {
        let Some(&len) = buf.first() else {
            return Ok(None);
        };
        if len == 0 {
            return Err(FrameError::ZeroLength);
        }
        let total = FRAME_PREFIX_SIZE + len as usize;
        let Some(bytes) = buf.get(..total) else {
            return Ok(None);
        };
        match bytes {
            [_, seq, code, payload @ ..] => Ok(Some((
                Frame::new(*seq, *code, payload.to_vec()),
                total,
            ))),
            _ => Ok(None),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame {{ len: {}, seq: {}, code: {}, data: [{}] }}",
            self.len_field(),
            self.seq,
            self.code,
            hex::encode(&self.payload)
        )
    }
}
