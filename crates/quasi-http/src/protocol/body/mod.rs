//! Body streaming abstractions for quasi http requests and responses.
//!
//! This module decouples the producer of payload bytes from the consumer. The design focuses on:
//!
//! - Streaming instead of buffering whole payloads
//! - A single explicit end-of-read signal, delivered exactly once on every exit path
//! - Never blocking a thread while one side waits on the other
//!
//! # Architecture
//!
//! - [`Body`]: the contract every payload implements (`read` + `end_read`)
//! - [`BytesBody`]: a fully buffered in-memory body
//! - [`PipeBody`]: matches an independent stream of writes against an independent stream of reads,
//!   used wherever a consumer must start reading before the producer is done
//!
//! Bodies that read from a connection live in the codec layer, see
//! [`ConnectionBody`](crate::codec::ConnectionBody).

mod bytes_body;
mod pipe_body;

pub use bytes_body::BytesBody;
pub use pipe_body::PipeBody;
pub use pipe_body::PipeWrite;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::ensure;
use crate::protocol::BodyError;

/// Size of the scratch buffer used when draining a body.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// The streaming contract of request and response payloads.
///
/// - `read` fills the buffer and returns the number of bytes read; `0` means the body is exhausted
///   (known length reached, or an unbounded stream ended). A second `read` issued while a previous
///   one is still pending fails with [`BodyError::ConcurrentRead`].
/// - `end_read` is idempotent. The first call records the terminal cause (`None` is a clean end),
///   releases held resources and makes pending and future reads fail with that cause
///   ([`BodyError::EndOfRead`] for a clean end). Later calls do nothing.
///
/// A body is owned by exactly one side at a time and handed off, never shared, when responsibility
/// passes between the engine and the application.
#[async_trait]
pub trait Body: Send + Sync + Debug {
    /// Exact byte count when non-negative, unknown when negative.
    fn content_length(&self) -> i64;

    /// Advisory content type.
    fn content_type(&self) -> Option<&str> {
        None
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, BodyError>;

    async fn end_read(&self, cause: Option<BodyError>);
}

/// An owned, type-erased body.
pub type BoxBody = Box<dyn Body>;

#[async_trait]
impl<B: Body + ?Sized> Body for Box<B> {
    fn content_length(&self) -> i64 {
        (**self).content_length()
    }

    fn content_type(&self) -> Option<&str> {
        (**self).content_type()
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, BodyError> {
        (**self).read(buf).await
    }

    async fn end_read(&self, cause: Option<BodyError>) {
        (**self).end_read(cause).await;
    }
}

#[async_trait]
impl<B: Body + ?Sized> Body for Arc<B> {
    fn content_length(&self) -> i64 {
        (**self).content_length()
    }

    fn content_type(&self) -> Option<&str> {
        (**self).content_type()
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, BodyError> {
        (**self).read(buf).await
    }

    async fn end_read(&self, cause: Option<BodyError>) {
        (**self).end_read(cause).await;
    }
}

/// Reads a body to its end and returns the collected bytes.
///
/// Fails with [`BodyError::BufferLimitExceeded`] as soon as more than `limit` bytes have been read.
/// The body is not ended; that stays the caller's responsibility.
pub async fn read_all_bytes(body: &dyn Body, limit: Option<usize>) -> Result<Bytes, BodyError> {
    let mut collected = match usize::try_from(body.content_length()) {
        Ok(length) => BytesMut::with_capacity(limit.map_or(length, |limit| length.min(limit))),
        Err(_) => BytesMut::new(),
    };

    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = body.read(&mut buf).await?;
        if n == 0 {
            return Ok(collected.freeze());
        }

        let size = collected.len() + n;
        if let Some(limit) = limit {
            ensure!(size <= limit, BodyError::buffer_limit_exceeded(size, limit));
        }
        collected.extend_from_slice(&buf[..n]);
    }
}
