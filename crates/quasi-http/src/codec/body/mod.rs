//! Body payload codecs and the bodies that move payloads over a connection.
//!
//! A lead chunk declaring a positive content length is followed by exactly that many raw bytes; a
//! negative content length is followed by body chunk frames up to the final empty chunk.
//!
//! # Components
//!
//! ## Decoders
//! - [`PayloadDecoder`]: picks length or chunked decoding from the declared content length
//! - [`ConnectionBody`]: the receive side [`Body`] backed by a `PayloadDecoder`
//!
//! ## Encoders
//! - [`PayloadEncoder`]: picks length or chunked encoding from the declared content length
//! - `write_body`: drains a [`Body`] through a `PayloadEncoder` onto the connection

mod chunked_decoder;
mod chunked_encoder;
mod connection_body;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use connection_body::ConnectionBody;
pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;

use crate::codec::MAX_BODY_CHUNK_PAYLOAD;
use crate::codec::framed::FrameWriter;
use crate::protocol::body::Body;
use crate::protocol::{PayloadItem, PayloadSize, TransferError};

/// Streams `body` behind an already written lead chunk.
///
/// Reads never ask a declared-length body for more than the bytes still owed. Once the declared
/// length is reached the body must report its end; any further byte fails the payload with
/// [`BodyError::ContentLengthNotSatisfied`](crate::protocol::BodyError::ContentLengthNotSatisfied).
pub(crate) async fn write_body(
    writer: &mut FrameWriter,
    body: &dyn Body,
    max_chunk_size: usize,
) -> Result<(), TransferError> {
    let size = PayloadSize::from_content_length(body.content_length());
    let mut encoder = PayloadEncoder::new(size, max_chunk_size);
    if size.is_empty() {
        return Ok(());
    }

    let chunk_size = max_chunk_size.clamp(1, MAX_BODY_CHUNK_PAYLOAD);
    let mut buf = vec![0u8; chunk_size];
    loop {
        // a declared length that is reached still gets one byte of room, so overlong bodies reach the encoder
        let limit = match encoder.remaining() {
            Some(0) => 1,
            Some(remaining) => usize::try_from(remaining).map_or(chunk_size, |remaining| remaining.min(chunk_size)),
            None => chunk_size,
        };

        let n = body.read(&mut buf[..limit]).await?;
        if n == 0 {
            break;
        }
        writer.write_frame(&mut encoder, PayloadItem::Chunk(&buf[..n])).await?;
    }

    writer.write_frame(&mut encoder, PayloadItem::<&[u8]>::Eof).await
}
