//! Frame level reading and writing over a [`Connection`].
//!
//! Both halves run a `tokio_util` codec against a byte buffer and the connection, and reset the
//! transfer's inactivity timer whenever bytes actually move.

use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::connection::Connection;
use crate::protocol::TransferError;
use crate::transfer::InactivityTimer;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Reads decoded frames from a connection.
///
/// Bytes read past the end of one frame stay buffered for the next decoder, which is how a body
/// decoder picks up right behind the lead chunk.
pub(crate) struct FrameReader {
    connection: Arc<dyn Connection>,
    timer: Arc<InactivityTimer>,
    buffer: BytesMut,
    scratch: Vec<u8>,
}

impl FrameReader {
    pub(crate) fn new(connection: Arc<dyn Connection>, timer: Arc<InactivityTimer>) -> Self {
        Self { connection, timer, buffer: BytesMut::with_capacity(READ_BUFFER_SIZE), scratch: vec![0; READ_BUFFER_SIZE] }
    }

    /// Reads until `decoder` yields an item.
    ///
    /// When the connection reaches end of stream the decoder gets one last chance through
    /// `decode_eof`; a decoder that still has nothing to yield is treated as a truncated stream.
    pub(crate) async fn read_frame<D: Decoder>(&mut self, decoder: &mut D) -> Result<D::Item, D::Error> {
        loop {
            if let Some(item) = decoder.decode(&mut self.buffer)? {
                return Ok(item);
            }

            let n = self.connection.read(&mut self.scratch).await?;
            if n == 0 {
                trace!(buffered = self.buffer.len(), "connection reached end of stream");
                return match decoder.decode_eof(&mut self.buffer)? {
                    Some(item) => Ok(item),
                    None => Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
                };
            }

            self.timer.touch();
            self.buffer.extend_from_slice(&self.scratch[..n]);
        }
    }
}

impl fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameReader").field("connection", &self.connection).field("buffered", &self.buffer.len()).finish()
    }
}

/// Writes encoded frames to a connection.
pub(crate) struct FrameWriter {
    connection: Arc<dyn Connection>,
    timer: Arc<InactivityTimer>,
    buffer: BytesMut,
}

impl FrameWriter {
    pub(crate) fn new(connection: Arc<dyn Connection>, timer: Arc<InactivityTimer>) -> Self {
        Self { connection, timer, buffer: BytesMut::with_capacity(READ_BUFFER_SIZE) }
    }

    /// Encodes one item and writes the resulting bytes, if any.
    pub(crate) async fn write_frame<I, E>(&mut self, encoder: &mut E, item: I) -> Result<(), TransferError>
    where
        E: Encoder<I>,
        E::Error: Into<TransferError>,
    {
        self.buffer.clear();
        encoder.encode(item, &mut self.buffer).map_err(Into::into)?;
        if self.buffer.is_empty() {
            return Ok(());
        }

        self.connection.write_all(&self.buffer).await?;
        self.timer.touch();
        Ok(())
    }
}

impl fmt::Debug for FrameWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameWriter").field("connection", &self.connection).finish()
    }
}
