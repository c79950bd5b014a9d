//! Quasi http codec module for framing messages onto a byte stream.
//!
//! Every exchange direction is one lead chunk followed by an optional body:
//!
//! ```text
//! [4-byte length][lead chunk payload]                     metadata, once per message
//! [raw body bytes]                                        when the content length is positive
//! [2-byte length][version][payload] ... [0x00 0x01 0x01]  when the content length is negative
//! ```
//!
//! # Architecture
//!
//! - [`LeadChunkCodec`]: encodes and decodes [`LeadChunk`] frames
//! - [`BodyChunkCodec`]: encodes and decodes single body chunk frames
//! - [`body`]: payload encoders/decoders picking raw or chunked framing, and [`ConnectionBody`]
//!
//! All codecs implement `tokio_util`'s [`Encoder`](tokio_util::codec::Encoder) and
//! [`Decoder`](tokio_util::codec::Decoder). Frame size ceilings are supplied by the caller.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use http::Method;
//! use quasi_http::codec::{LeadChunk, LeadChunkCodec};
//! use quasi_http::protocol::QuasiRequest;
//! use tokio_util::codec::{Decoder, Encoder};
//!
//! let request = QuasiRequest::new(Method::GET, "/status");
//! let mut codec = LeadChunkCodec::new(8 * 1024);
//!
//! let mut buffer = BytesMut::new();
//! codec.encode(LeadChunk::from_request(&request), &mut buffer).unwrap();
//!
//! let lead = codec.decode(&mut buffer).unwrap().unwrap();
//! assert_eq!(lead.into_request().unwrap().path, "/status");
//! ```

pub mod body;
mod body_chunk;
pub(crate) mod framed;
mod lead_chunk;

pub use body::ConnectionBody;
pub use body_chunk::BODY_CHUNK_VERSION;
pub use body_chunk::BodyChunkCodec;
pub use body_chunk::MAX_BODY_CHUNK_PAYLOAD;
pub use lead_chunk::LEAD_CHUNK_VERSION;
pub use lead_chunk::LeadChunk;
pub use lead_chunk::LeadChunkCodec;
pub use lead_chunk::LeadChunkKind;
pub use lead_chunk::MAX_LEAD_CHUNK_SIZE;
