//! Decoder for bodies of unknown length, sent as body chunk frames.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::BodyChunkCodec;
use crate::protocol::{BodyError, PayloadItem};

/// Decodes body chunk frames until the final empty chunk.
///
/// Once the final chunk was seen every further call yields [`PayloadItem::Eof`] without touching
/// the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    codec: BodyChunkCodec,
    finished: bool,
}

impl ChunkedDecoder {
    pub fn new(max_chunk_size: usize) -> Self {
        Self { codec: BodyChunkCodec::new(max_chunk_size), finished: false }
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = BodyError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.finished {
            return Ok(Some(PayloadItem::Eof));
        }

        let item = self.codec.decode(src)?;
        if item.as_ref().is_some_and(PayloadItem::is_eof) {
            self.finished = true;
        }
        Ok(item)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.finished {
            return Ok(Some(PayloadItem::Eof));
        }

        let item = self.codec.decode_eof(src)?;
        if item.as_ref().is_some_and(PayloadItem::is_eof) {
            self.finished = true;
        }
        Ok(item)
    }
}
