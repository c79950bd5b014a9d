use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;

use crate::ensure;
use crate::protocol::{BodyError, PayloadItem};

/// Writes a payload of declared length as raw bytes.
///
/// Refuses to write past the declared length and to finish before reaching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    expected: u64,
    length: u64,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { expected: length, length }
    }

    pub fn remaining(&self) -> u64 {
        self.length
    }

    pub fn is_finish(&self) -> bool {
        self.length == 0
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = BodyError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let written = self.expected - self.length;
        match item {
            PayloadItem::Chunk(bytes) => {
                let size = bytes.remaining() as u64;
                ensure!(
                    size <= self.length,
                    BodyError::content_length_not_satisfied(self.expected, written + size)
                );
                dst.put(bytes);
                self.length -= size;
                Ok(())
            }
            PayloadItem::Eof => {
                ensure!(self.length == 0, BodyError::content_length_not_satisfied(self.expected, written));
                Ok(())
            }
        }
    }
}
