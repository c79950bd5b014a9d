//! The receive side body, read straight from the connection behind a lead chunk.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::codec::body::PayloadDecoder;
use crate::codec::framed::FrameReader;
use crate::protocol::body::Body;
use crate::protocol::{BodyError, PayloadItem, PayloadSize, TransferError};
use crate::transfer::Transfer;

/// A [`Body`] decoding a declared-length or chunk-framed payload from a connection.
///
/// Every successful read resets the inactivity timer of the transfer the connection belongs to.
/// A body handed to a caller after its transfer finished (a streamed response) owns that transfer
/// and releases the connection when it reaches end of stream, fails, is ended, or is dropped.
#[derive(Debug)]
pub struct ConnectionBody {
    content_length: i64,
    content_type: Option<String>,
    reader: tokio::sync::Mutex<BodyReader>,
    ended: Mutex<Option<BodyError>>,
    end_signal: CancellationToken,
    owner: Mutex<Option<Arc<Transfer>>>,
}

#[derive(Debug)]
struct BodyReader {
    frames: FrameReader,
    decoder: PayloadDecoder,
    current: Bytes,
    eof: bool,
}

impl BodyReader {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, BodyError> {
        loop {
            if !self.current.is_empty() {
                let n = self.current.len().min(buf.len());
                buf[..n].copy_from_slice(&self.current[..n]);
                self.current.advance(n);
                return Ok(n);
            }

            if self.eof {
                return Ok(0);
            }

            match self.frames.read_frame(&mut self.decoder).await? {
                PayloadItem::Chunk(bytes) => self.current = bytes,
                PayloadItem::Eof => {
                    trace!("connection body reached end of stream");
                    self.eof = true;
                }
            }
        }
    }
}

impl ConnectionBody {
    pub(crate) fn new(
        frames: FrameReader,
        content_length: i64,
        content_type: Option<String>,
        max_chunk_size: usize,
    ) -> Self {
        let decoder = PayloadDecoder::new(PayloadSize::from_content_length(content_length), max_chunk_size);
        Self {
            content_length,
            content_type,
            reader: tokio::sync::Mutex::new(BodyReader { frames, decoder, current: Bytes::new(), eof: false }),
            ended: Mutex::new(None),
            end_signal: CancellationToken::new(),
            owner: Mutex::new(None),
        }
    }

    /// Hands the release of `transfer` over to this body.
    pub(crate) fn own_transfer(&self, transfer: Arc<Transfer>) {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = Some(transfer);
    }

    fn lock_ended(&self) -> MutexGuard<'_, Option<BodyError>> {
        self.ended.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the terminal cause; returns false if one was already recorded.
    fn end(&self, cause: BodyError) -> bool {
        let mut ended = self.lock_ended();
        if ended.is_some() {
            return false;
        }
        *ended = Some(cause);
        true
    }

    async fn release_owner(&self, error: Option<TransferError>) {
        let owner = self.owner.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(transfer) = owner {
            transfer.abort(error.as_ref()).await;
        }
    }
}

#[async_trait]
impl Body for ConnectionBody {
    fn content_length(&self) -> i64 {
        self.content_length
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, BodyError> {
        if let Some(cause) = self.lock_ended().clone() {
            return Err(cause);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let Ok(mut reader) = self.reader.try_lock() else {
            return Err(BodyError::ConcurrentRead);
        };

        let result = tokio::select! {
            biased;
            _ = self.end_signal.cancelled() => Err(self.lock_ended().clone().unwrap_or(BodyError::EndOfRead)),
            result = reader.read(buf) => result,
        };
        drop(reader);

        match &result {
            Ok(0) => self.release_owner(None).await,
            Ok(_) => {}
            Err(e) => {
                if self.end(e.clone()) {
                    self.end_signal.cancel();
                }
                self.release_owner(Some(TransferError::from(e.clone()))).await;
            }
        }
        result
    }

    async fn end_read(&self, cause: Option<BodyError>) {
        if self.end(cause.clone().unwrap_or(BodyError::EndOfRead)) {
            trace!(cause = ?cause, "end connection body read");
            self.end_signal.cancel();
        }
        self.release_owner(cause.map(TransferError::from)).await;
    }
}
