//! RFC 1055 SLIP framing: a pure encoder and a byte-at-a-time receive
//! state machine.

use crate::error::FrameError;

/// Frame delimiter.
pub const END: u8 = 0xC0;
/// Escape introducer.
pub const ESC: u8 = 0xDB;
/// Escaped substitute for `END`.
pub const ESC_END: u8 = 0xDC;
/// Escaped substitute for `ESC`.
pub const ESC_ESC: u8 = 0xDD;

/// Default receive buffer capacity in bytes.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Receive state of the framer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlipState {
    /// Discarding bytes until the next `END`
    WaitEnd,
    /// Accumulating payload bytes
    StoreIncoming,
    /// The previous byte was `ESC`
    Escaping,
}

/// Byte-oriented SLIP receive state machine with a bounded buffer.
///
/// Feed it one byte at a time; a complete payload is returned on the
/// closing `END`. The framer owns no timing: a half-received frame simply
/// waits for more bytes. On overflow it resets and resyncs at the next
/// `END`.
#[derive(Debug)]
pub struct SlipDecoder {
    state: SlipState,
    rx: Vec<u8>,
    capacity: usize,
}

impl Default for SlipDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SlipDecoder {
    /// Creates a framer with the default buffer capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a framer with an explicit buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: SlipState::WaitEnd,
            rx: Vec::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
        }
    }

    /// Current receive state.
    #[must_use]
    pub const fn state(&self) -> SlipState {
        self.state
    }

    /// Consumes one byte, returning a complete payload if this byte
    /// closed a frame.
    pub fn feed(&mut self, byte: u8) -> Result<Option<Vec<u8>>, FrameError> {
        match self.state {
            SlipState::WaitEnd => {
                // Discard everything until we receive an END byte.
                if byte == END {
                    self.state = SlipState::StoreIncoming;
                }
                Ok(None)
            }
            SlipState::Escaping => {
                self.state = SlipState::StoreIncoming;
                match byte {
                    ESC_ESC => self.push(ESC),
                    ESC_END => self.push(END),
                    // Unexpected escape: store the byte anyway and let the
                    // upper layer figure it out.
                    other => self.push(other),
                }
            }
            SlipState::StoreIncoming => match byte {
                ESC => {
                    self.state = SlipState::Escaping;
                    Ok(None)
                }
                END => {
                    // End of packet only if data was stored; back-to-back
                    // END bytes are tolerated.
                    if self.rx.is_empty() {
                        Ok(None)
                    } else {
                        self.state = SlipState::WaitEnd;
                        Ok(Some(std::mem::take(&mut self.rx)))
                    }
                }
                other => self.push(other),
            },
        }
    }

    fn push(&mut self, byte: u8) -> Result<Option<Vec<u8>>, FrameError> {
        if self.rx.len() >= self.capacity {
            self.rx.clear();
            self.state = SlipState::WaitEnd;
            return Err(FrameError::Overflow {
                capacity: self.capacity,
            });
        }
        self.rx.push(byte);
        Ok(None)
    }
}

/// Encodes a payload into a framed packet: `END`, escaped body, `END`.
#[must_use]
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(END);
    for &byte in payload {
        match byte {
            END => {
                out.push(ESC);
                out.push(ESC_END);
            }
            ESC => {
                out.push(ESC);
                out.push(ESC_ESC);
            }
            other => out.push(other),
        }
    }
    out.push(END);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn decode_all(decoder: &mut SlipDecoder, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut payloads = Vec::new();
        for &b in bytes {
            if let Ok(Some(payload)) = decoder.feed(b) {
                payloads.push(payload);
            }
        }
        payloads
    }

    #[test]
    fn encode_escapes_reserved_bytes() {
        // END and ESC get substituted, everything else passes through
        assert_eq!(
            encode(&[0xC0, 0xDB, 0x00]),
            vec![0xC0, 0xDB, 0xDC, 0xDB, 0xDD, 0x00, 0xC0]
        );
    }

    #[test]
    fn decode_recovers_reserved_bytes() {
        let mut decoder = SlipDecoder::new();
        let payloads = decode_all(&mut decoder, &encode(&[0xC0, 0xDB, 0x00]));
        assert_eq!(payloads, vec![vec![0xC0, 0xDB, 0x00]]);
    }

    #[test]
    fn garbage_before_first_end_is_discarded() {
        let mut decoder = SlipDecoder::new();
        let mut stream = vec![0x11, 0x22, 0x33];
        stream.extend_from_slice(&encode(&[0x01, 0x02]));
        assert_eq!(decode_all(&mut decoder, &stream), vec![vec![0x01, 0x02]]);
    }

    #[test]
    fn back_to_back_end_bytes_are_tolerated() {
        let mut decoder = SlipDecoder::new();
        let stream = [END, END, END, 0x05, END];
        assert_eq!(decode_all(&mut decoder, &stream), vec![vec![0x05]]);
    }

    #[test]
    fn unexpected_escape_is_stored_verbatim() {
        let mut decoder = SlipDecoder::new();
        let stream = [END, ESC, 0x42, END];
        assert_eq!(decode_all(&mut decoder, &stream), vec![vec![0x42]]);
    }

    #[test]
    fn overflow_resets_to_wait_end() {
        let mut decoder = SlipDecoder::with_capacity(4);
        let mut overflowed = false;
        for b in [END, 1, 2, 3, 4, 5] {
            if decoder.feed(b).is_err() {
                overflowed = true;
                break;
            }
        }
        assert!(overflowed);
        assert_eq!(decoder.state(), SlipState::WaitEnd);
        // The framer resyncs on the next END and keeps working.
        let stream = encode(&[0xAA]);
        let payloads = decode_all(&mut decoder, &stream);
        assert_eq!(payloads, vec![vec![0xAA]]);
    }

    #[test]
    fn consecutive_frames_share_one_decoder() {
        let mut decoder = SlipDecoder::new();
        let mut stream = encode(&[0x01]);
        stream.extend_from_slice(&encode(&[0x02, 0x03]));
        assert_eq!(
            decode_all(&mut decoder, &stream),
            vec![vec![0x01], vec![0x02, 0x03]]
        );
    }

    #[quickcheck]
    fn round_trip_any_payload(payload: Vec<u8>) -> bool {
        if payload.is_empty() {
            // Empty frames are never emitted by the decoder.
            return true;
        }
        let mut decoder = SlipDecoder::with_capacity(payload.len());
        decode_all(&mut decoder, &encode(&payload)) == vec![payload]
    }
}
