//! Encoder and decoder for body chunk frames.
//!
//! A body chunk is `[2-byte big-endian length][1-byte version][payload]`, where the length covers
//! the version byte plus the payload. A chunk with an empty payload ends the body.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::ensure;
use crate::protocol::{CodecError, PayloadItem};

/// Size of the length prefix of a body chunk frame.
pub const BODY_CHUNK_PREFIX_SIZE: usize = 2;

/// Size of the chunk header covered by the length prefix.
pub const BODY_CHUNK_HEADER_SIZE: usize = 1;

/// Version byte written into every body chunk.
pub const BODY_CHUNK_VERSION: u8 = 1;

/// Largest payload a single body chunk can carry.
pub const MAX_BODY_CHUNK_PAYLOAD: usize = u16::MAX as usize - BODY_CHUNK_HEADER_SIZE;

/// Frames body fragments, rejecting payloads larger than `max_payload` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyChunkCodec {
    max_payload: usize,
}

impl BodyChunkCodec {
    /// Creates a codec; the ceiling is clamped to what the 2-byte prefix can express.
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload: max_payload.min(MAX_BODY_CHUNK_PAYLOAD) }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for BodyChunkCodec {
    fn default() -> Self {
        Self::new(MAX_BODY_CHUNK_PAYLOAD)
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for BodyChunkCodec {
    type Error = CodecError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                let size = bytes.remaining();
                ensure!(size > 0, CodecError::invalid_body_chunk("empty chunk must be the final chunk"));
                ensure!(size <= self.max_payload, CodecError::frame_too_large(size, self.max_payload));

                dst.reserve(BODY_CHUNK_PREFIX_SIZE + BODY_CHUNK_HEADER_SIZE + size);
                put_header(dst, size);
                dst.put(bytes);
                trace!(size, "encoded body chunk");
            }
            PayloadItem::Eof => {
                put_header(dst, 0);
                trace!("encoded final body chunk");
            }
        }
        Ok(())
    }
}

fn put_header(dst: &mut BytesMut, payload_size: usize) {
    // payload_size is bounded by MAX_BODY_CHUNK_PAYLOAD
    dst.put_u16((payload_size + BODY_CHUNK_HEADER_SIZE) as u16);
    dst.put_u8(BODY_CHUNK_VERSION);
}

impl Decoder for BodyChunkCodec {
    type Item = PayloadItem;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < BODY_CHUNK_PREFIX_SIZE {
            return Ok(None);
        }

        let len = usize::from(u16::from_be_bytes([src[0], src[1]]));
        ensure!(len >= BODY_CHUNK_HEADER_SIZE, CodecError::invalid_body_chunk("missing chunk header"));

        let size = len - BODY_CHUNK_HEADER_SIZE;
        ensure!(size <= self.max_payload, CodecError::frame_too_large(size, self.max_payload));

        let frame_size = BODY_CHUNK_PREFIX_SIZE + len;
        if src.len() < frame_size {
            src.reserve(frame_size - src.len());
            return Ok(None);
        }

        let version = src[BODY_CHUNK_PREFIX_SIZE];
        ensure!(version == BODY_CHUNK_VERSION, CodecError::UnsupportedVersion(version));

        src.advance(BODY_CHUNK_PREFIX_SIZE + BODY_CHUNK_HEADER_SIZE);
        if size == 0 {
            trace!("decoded final body chunk");
            return Ok(Some(PayloadItem::Eof));
        }

        trace!(size, "decoded body chunk");
        Ok(Some(PayloadItem::Chunk(src.split_to(size).freeze())))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }

        let missing = if src.len() < BODY_CHUNK_PREFIX_SIZE {
            BODY_CHUNK_PREFIX_SIZE - src.len()
        } else {
            BODY_CHUNK_PREFIX_SIZE + usize::from(u16::from_be_bytes([src[0], src[1]])) - src.len()
        };
        Err(CodecError::unexpected_end_of_stream(missing))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn encode(item: PayloadItem) -> Result<BytesMut, CodecError> {
        let mut dst = BytesMut::new();
        BodyChunkCodec::new(8).encode(item, &mut dst)?;
        Ok(dst)
    }

    #[test]
    fn chunk_layout() {
        let bytes = encode(PayloadItem::Chunk(Bytes::from_static(b"ab"))).unwrap();
        assert_eq!(&bytes[..], &[0, 3, 1, b'a', b'b']);

        let bytes = encode(PayloadItem::Eof).unwrap();
        assert_eq!(&bytes[..], &[0, 1, 1]);
    }

    #[test]
    fn invalid_chunks_are_not_encoded() {
        let result = encode(PayloadItem::Chunk(Bytes::new()));
        assert!(matches!(result, Err(CodecError::InvalidBodyChunk { .. })));

        let result = encode(PayloadItem::Chunk(Bytes::from_static(b"123456789")));
        assert!(matches!(result, Err(CodecError::FrameTooLarge { size: 9, max_size: 8 })));
    }

    #[test]
    fn decode_sequence_of_chunks() {
        let mut src = BytesMut::from(&[0u8, 3, 1, b'a', b'b', 0, 3, 1, b'c', b'd', 0, 1, 1][..]);
        let mut codec = BodyChunkCodec::new(8);

        assert_eq!(codec.decode(&mut src).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"ab"))));
        assert_eq!(codec.decode(&mut src).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"cd"))));
        assert_eq!(codec.decode(&mut src).unwrap(), Some(PayloadItem::Eof));
        assert!(src.is_empty());
        assert_eq!(codec.decode(&mut src).unwrap(), None);
    }

    #[test]
    fn partial_chunk_needs_more_bytes() {
        let mut codec = BodyChunkCodec::new(8);
        let mut src = BytesMut::from(&[0u8, 4, 1, b'a'][..]);
        assert_eq!(codec.decode(&mut src).unwrap(), None);
        assert_eq!(src.len(), 4);

        src.extend_from_slice(b"bc");
        assert_eq!(codec.decode(&mut src).unwrap(), Some(PayloadItem::Chunk(Bytes::from_static(b"abc"))));
    }

    #[test]
    fn malformed_chunks_are_rejected() {
        let mut codec = BodyChunkCodec::new(8);

        let result = codec.decode(&mut BytesMut::from(&[0u8, 0][..]));
        assert!(matches!(result, Err(CodecError::InvalidBodyChunk { .. })));

        let result = codec.decode(&mut BytesMut::from(&[0u8, 2, 9, b'a'][..]));
        assert!(matches!(result, Err(CodecError::UnsupportedVersion(9))));

        let result = codec.decode(&mut BytesMut::from(&[0u8, 100][..]));
        assert!(matches!(result, Err(CodecError::FrameTooLarge { size: 99, max_size: 8 })));

        let result = codec.decode_eof(&mut BytesMut::from(&[0u8, 3, 1][..]));
        assert!(matches!(result, Err(CodecError::UnexpectedEndOfStream { missing: 2 })));
    }

    #[test]
    fn ceiling_is_clamped_to_prefix_range() {
        assert_eq!(BodyChunkCodec::new(usize::MAX).max_payload(), 65_534);
    }
}
