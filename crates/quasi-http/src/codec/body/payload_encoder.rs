use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;

use crate::codec::body::chunked_encoder::ChunkedEncoder;
use crate::codec::body::length_encoder::LengthEncoder;
use crate::protocol::{BodyError, PayloadItem, PayloadSize};

/// Encodes the body that follows a lead chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadEncoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    /// declared length, raw bytes
    Length(LengthEncoder),

    /// unknown length, body chunk frames
    Chunked(ChunkedEncoder),

    /// no body follows the lead chunk
    NoBody,
}

impl PayloadEncoder {
    /// Picks the encoding implied by a declared content length.
    pub fn new(size: PayloadSize, max_chunk_size: usize) -> Self {
        match size {
            PayloadSize::Length(length) => Self::fix_length(length),
            PayloadSize::Chunked => Self::chunked(max_chunk_size),
            PayloadSize::Empty => Self::empty(),
        }
    }

    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked(max_chunk_size: usize) -> Self {
        Self { kind: Kind::Chunked(ChunkedEncoder::new(max_chunk_size)) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthEncoder::new(size)) }
    }

    /// Bytes still expected for a declared length payload, `None` otherwise.
    pub fn remaining(&self) -> Option<u64> {
        match &self.kind {
            Kind::Length(encoder) => Some(encoder.remaining()),
            Kind::Chunked(_) | Kind::NoBody => None,
        }
    }

    pub fn is_finish(&self) -> bool {
        match &self.kind {
            Kind::Length(encoder) => encoder.is_finish(),
            Kind::Chunked(encoder) => encoder.is_finish(),
            Kind::NoBody => true,
        }
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for PayloadEncoder {
    type Error = BodyError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match &mut self.kind {
            Kind::Length(encoder) => encoder.encode(item, dst),
            Kind::Chunked(encoder) => encoder.encode(item, dst),
            Kind::NoBody => Ok(()),
        }
    }
}
