//! Error types for framing and transactions.

use rustymsg::CodecError;
use thiserror::Error;

/// Errors surfaced by the SLIP receive state machine.
///
/// Invalid escapes are tolerated (the byte is stored verbatim), so the
/// only failure the framer itself reports is buffer exhaustion.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The bounded receive buffer filled up mid-frame. The framer has
    /// reset itself and will resync at the next `END`.
    #[error("frame exceeds the {capacity}-byte receive buffer")]
    Overflow {
        /// Configured buffer capacity
        capacity: usize,
    },
}

/// Errors surfaced by the transaction layer.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// A frame's length byte disagrees with the bytes on the wire, or a
    /// light payload does not fit its message layout.
    #[error("bad length for pid 0x{pid:02X}: {len} payload bytes")]
    BadLength {
        /// The frame's primitive id
        pid: u8,
        /// Offending payload length
        len: usize,
    },

    /// CRC-16/CCITT validation failed; the frame is dropped.
    #[error("bad crc: expected 0x{expected:04X}, got 0x{actual:04X}")]
    BadCrc {
        /// CRC computed over the received bytes
        expected: u16,
        /// CRC carried by the frame
        actual: u16,
    },

    /// The deadline expired before the response frame arrived.
    #[error("transaction timed out")]
    Timeout,

    /// The byte channel reached EOF or failed.
    #[error("channel closed")]
    ChannelClosed,

    /// A registered message failed to decode; the frame is dropped.
    #[error("undecodable payload: {0}")]
    Payload(#[from] CodecError),
}
