//! Decoder for bodies whose exact length was declared in the lead chunk.
//!
//! The raw body bytes follow the lead chunk directly, without any framing.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::{BodyError, PayloadItem};

/// A decoder for a payload of known length.
///
/// Tracks the bytes still expected so the stream ending early is reported as
/// [`BodyError::ContentLengthNotSatisfied`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    expected: u64,
    /// The number of bytes remaining to be read from the payload
    length: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { expected: length, length }
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = BodyError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.length == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        // never consume bytes past the declared length
        let len = self.length.min(src.len() as u64);
        let bytes = src.split_to(len as usize).freeze();

        self.length -= len;
        Ok(Some(PayloadItem::Chunk(bytes)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Err(BodyError::content_length_not_satisfied(self.expected, self.expected - self.length)),
        }
    }
}
