use bytes::{Buf, Bytes};
use std::collections::HashMap;

/// Opaque side information threaded alongside a request or response.
///
/// Transports fill it with deployment specific values (peer identity, endpoint names); the
/// transfer engine passes it through without interpreting it.
pub type Environment = HashMap<String, String>;

/// Represents an item in a body payload stream.
///
/// Body encoders consume these items and body decoders produce them: either a non-empty
/// fragment of data, or the end of the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Marks the end of the payload stream
    Eof,
}

/// Represents the size information of a body payload, as declared in a lead chunk.
///
/// - Known length: exactly that many raw bytes follow the lead chunk
/// - Chunked: body chunk frames follow until an empty one
/// - Empty: no body at all
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload of unknown length, sent as body chunk frames
    Chunked,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    /// Maps a declared content length to a payload size: zero means no body, a negative value
    /// means the length is unknown.
    pub fn from_content_length(content_length: i64) -> Self {
        match u64::try_from(content_length) {
            Ok(0) => PayloadSize::Empty,
            Ok(length) => PayloadSize::Length(length),
            Err(_) => PayloadSize::Chunked,
        }
    }

    /// The content length to declare for this payload size.
    pub fn content_length(self) -> i64 {
        match self {
            PayloadSize::Length(length) => i64::try_from(length).unwrap_or(i64::MAX),
            PayloadSize::Chunked => -1,
            PayloadSize::Empty => 0,
        }
    }

    /// Returns true if the payload uses body chunk frames
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

impl<D: Buf> PayloadItem<D> {
    /// Returns true if this item represents the end of the payload stream
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    /// Returns true if this item contains chunk data
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    /// Returns a reference to the contained bytes if this is a Chunk
    ///
    /// Returns None if this is an EOF marker
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    /// Consumes the PayloadItem and returns the contained bytes if this is a Chunk
    ///
    /// Returns None if this is an EOF marker
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_size_from_content_length() {
        assert_eq!(PayloadSize::from_content_length(0), PayloadSize::Empty);
        assert_eq!(PayloadSize::from_content_length(5), PayloadSize::Length(5));
        assert_eq!(PayloadSize::from_content_length(-1), PayloadSize::Chunked);
        assert_eq!(PayloadSize::from_content_length(i64::MIN), PayloadSize::Chunked);

        assert_eq!(PayloadSize::Length(5).content_length(), 5);
        assert_eq!(PayloadSize::Chunked.content_length(), -1);
        assert_eq!(PayloadSize::Empty.content_length(), 0);
    }
}
