use std::error::Error;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by applications and other external collaborators.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Top-level error surfaced to the initiator of an exchange.
///
/// Exactly one of a response or a `TransferError` reaches the send caller (or the accept loop on
/// the receive side) for every exchange. [`TransferError::Timeout`] and [`TransferError::Cancelled`]
/// mark exchanges that were given up rather than failed.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("codec error: {source}")]
    Codec {
        #[from]
        source: CodecError,
    },

    #[error("body error: {source}")]
    Body {
        #[from]
        source: BodyError,
    },

    #[error("transfer timed out")]
    Timeout,

    #[error("transfer cancelled")]
    Cancelled,

    #[error("application returned no response")]
    NoResponse,

    #[error("application error: {source}")]
    Application { source: BoxError },

    #[error("transport error: {source}")]
    Transport {
        #[from]
        source: io::Error,
    },
}

impl TransferError {
    pub fn application<E: Into<BoxError>>(e: E) -> Self {
        Self::Application { source: e.into() }
    }

    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The terminal cause handed to bodies that are still open when a transfer aborts with `self`.
    pub(crate) fn to_body_cause(&self) -> BodyError {
        match self {
            Self::Timeout => BodyError::Timeout,
            Self::Cancelled => BodyError::Cancelled,
            Self::Body { source } => source.clone(),
            Self::Codec { source } => BodyError::Codec { source: source.clone() },
            other => BodyError::aborted(other),
        }
    }
}

/// Framing errors raised while encoding or decoding lead chunks and body chunks.
///
/// A framing error leaves the frame boundary unknown, so the transfer carrying it is always aborted.
#[derive(Error, Debug, Clone)]
pub enum CodecError {
    #[error("frame size {size} exceed the limit {max_size}")]
    FrameTooLarge { size: usize, max_size: usize },

    #[error("unexpected end of stream, {missing} more bytes expected")]
    UnexpectedEndOfStream { missing: usize },

    #[error("invalid lead chunk: {reason}")]
    InvalidLeadChunk { reason: String },

    #[error("invalid body chunk: {reason}")]
    InvalidBodyChunk { reason: String },

    #[error("unsupported frame version: {0}")]
    UnsupportedVersion(u8),

    #[error("io error: {source}")]
    Io { source: Arc<io::Error> },
}

impl CodecError {
    pub fn frame_too_large(size: usize, max_size: usize) -> Self {
        Self::FrameTooLarge { size, max_size }
    }

    pub fn unexpected_end_of_stream(missing: usize) -> Self {
        Self::UnexpectedEndOfStream { missing }
    }

    pub fn invalid_lead_chunk<S: ToString>(str: S) -> Self {
        Self::InvalidLeadChunk { reason: str.to_string() }
    }

    pub fn invalid_body_chunk<S: ToString>(str: S) -> Self {
        Self::InvalidBodyChunk { reason: str.to_string() }
    }
}

impl From<io::Error> for CodecError {
    fn from(e: io::Error) -> Self {
        Self::Io { source: Arc::new(e) }
    }
}

/// Errors raised through the [`Body`](crate::protocol::body::Body) contract.
///
/// Besides contract violations (`ConcurrentRead`, `BufferLimitExceeded`, `EndOfWrite`) this type
/// carries the terminal cause recorded by `end_read`, which is why it is cheap to clone.
#[derive(Error, Debug, Clone)]
pub enum BodyError {
    #[error("concurrent read on the same body")]
    ConcurrentRead,

    #[error("write buffer limit exceeded, current: {size} exceed the limit {limit}")]
    BufferLimitExceeded { size: usize, limit: usize },

    #[error("body has already reached end of write")]
    EndOfWrite,

    #[error("body has already reached end of read")]
    EndOfRead,

    #[error("content length not satisfied, declared {expected} bytes but got {actual}")]
    ContentLengthNotSatisfied { expected: u64, actual: u64 },

    #[error("codec error: {source}")]
    Codec {
        #[from]
        source: CodecError,
    },

    #[error("io error: {source}")]
    Io { source: Arc<io::Error> },

    #[error("transfer timed out")]
    Timeout,

    #[error("transfer cancelled")]
    Cancelled,

    #[error("transfer aborted: {reason}")]
    Aborted { reason: String },
}

impl BodyError {
    pub fn buffer_limit_exceeded(size: usize, limit: usize) -> Self {
        Self::BufferLimitExceeded { size, limit }
    }

    pub fn content_length_not_satisfied(expected: u64, actual: u64) -> Self {
        Self::ContentLengthNotSatisfied { expected, actual }
    }

    pub fn aborted<S: ToString>(str: S) -> Self {
        Self::Aborted { reason: str.to_string() }
    }
}

impl From<io::Error> for BodyError {
    fn from(e: io::Error) -> Self {
        Self::Io { source: Arc::new(e) }
    }
}
