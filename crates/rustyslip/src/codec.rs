//! `tokio-util` codec adapter, for driving the framer from a
//! [`Framed`](tokio_util::codec::Framed) stream instead of byte-at-a-time
//! reads.

use crate::slip::{self, SlipDecoder};
use bytes::{Buf, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// SLIP frame codec over a byte stream.
#[derive(Debug, Default)]
pub struct SlipCodec {
    decoder: SlipDecoder,
}

impl SlipCodec {
    /// Creates a codec with the default receive capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for SlipCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, io::Error> {
        while src.has_remaining() {
            let byte = src.get_u8();
            match self.decoder.feed(byte) {
                Ok(Some(payload)) => return Ok(Some(Bytes::from(payload))),
                Ok(None) => {}
                Err(err) => return Err(io::Error::new(io::ErrorKind::InvalidData, err)),
            }
        }
        Ok(None)
    }
}

impl Encoder<&[u8]> for SlipCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.extend_from_slice(&slip::encode(item));
        Ok(())
    }
}
