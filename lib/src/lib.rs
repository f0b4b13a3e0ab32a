// Shared Rust library for the meshwork host and its tests
pub mod frame;
pub mod messages;
pub mod stats;

pub use frame::{Frame, FrameError};
pub use messages::{CodecError, DeliveryMode, ProtocolMessage};

/// Radio node identifier as carried on the wire.
pub type NodeId = u8;

/// Per-exchange correlation id, wraps at 256.
pub type Seq = u8;

// Half of the sequence space. A sequence number that is less than this
// distance ahead of another is considered to come after it.
const SEQ_WINDOW: u8 = 128;

// Checks if `seq` comes after `prev` in the circular sequence space.
// `seq` is after `prev` if `0 < seq - prev < 128` modulo 256.
pub fn seq_is_after(seq: Seq, prev: Seq) -> bool {
    let distance = seq.wrapping_sub(prev);
    distance != 0 && distance < SEQ_WINDOW
}

// Checks if `seq` precedes `expected`, i.e. it belongs to an earlier exchange.
pub fn seq_precedes(seq: Seq, expected: Seq) -> bool {
    seq_is_after(expected, seq)
}
