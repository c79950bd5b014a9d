use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

use crate::codec::BodyChunkCodec;
use crate::protocol::{BodyError, PayloadItem};

/// Writes a payload of unknown length as body chunk frames, ending with the final empty chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    codec: BodyChunkCodec,
    eof: bool,
}

impl ChunkedEncoder {
    pub fn new(max_chunk_size: usize) -> Self {
        Self { codec: BodyChunkCodec::new(max_chunk_size), eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = BodyError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            warn!("encode payload_item but final chunk already written");
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) if !bytes.has_remaining() => Ok(()),
            PayloadItem::Chunk(bytes) => Ok(self.codec.encode(PayloadItem::Chunk(bytes), dst)?),
            PayloadItem::Eof => {
                self.eof = true;
                Ok(self.codec.encode(PayloadItem::<D>::Eof, dst)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn frames_chunks_and_final_chunk_once() {
        let mut encoder = ChunkedEncoder::new(16);
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"ab")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::new()), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert_eq!(&dst[..], &[0, 3, 1, b'a', b'b', 0, 1, 1]);
        assert!(encoder.is_finish());
    }
}
