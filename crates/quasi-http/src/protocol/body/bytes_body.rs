use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::{Buf, Bytes};

use crate::protocol::BodyError;
use crate::protocol::body::Body;

/// A body backed by bytes that are already in memory.
///
/// The content length is always the exact byte count. Reads never wait, so a concurrent read can
/// not be observed.
#[derive(Debug)]
pub struct BytesBody {
    content_type: Option<String>,
    content_length: i64,
    state: Mutex<BytesState>,
}

#[derive(Debug)]
struct BytesState {
    remaining: Bytes,
    ended: Option<BodyError>,
}

impl BytesBody {
    pub fn new<B: Into<Bytes>>(bytes: B) -> Self {
        let bytes = bytes.into();
        Self {
            content_type: None,
            content_length: i64::try_from(bytes.len()).unwrap_or(i64::MAX),
            state: Mutex::new(BytesState { remaining: bytes, ended: None }),
        }
    }

    pub fn from_static(bytes: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(bytes))
    }

    pub fn empty() -> Self {
        Self::new(Bytes::new())
    }

    pub fn with_content_type<S: Into<String>>(mut self, content_type: S) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub(crate) fn with_optional_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    fn lock(&self) -> MutexGuard<'_, BytesState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl From<Bytes> for BytesBody {
    fn from(bytes: Bytes) -> Self {
        Self::new(bytes)
    }
}

impl From<String> for BytesBody {
    fn from(str: String) -> Self {
        Self::new(str)
    }
}

impl From<&'static str> for BytesBody {
    fn from(str: &'static str) -> Self {
        Self::new(str)
    }
}

#[async_trait]
impl Body for BytesBody {
    fn content_length(&self) -> i64 {
        self.content_length
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    async fn read(&self, buf: &mut [u8]) -> Result<usize, BodyError> {
        let mut state = self.lock();
        if let Some(cause) = &state.ended {
            return Err(cause.clone());
        }

        let n = state.remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&state.remaining[..n]);
        state.remaining.advance(n);
        Ok(n)
    }

    async fn end_read(&self, cause: Option<BodyError>) {
        let mut state = self.lock();
        if state.ended.is_none() {
            state.ended = Some(cause.unwrap_or(BodyError::EndOfRead));
            state.remaining = Bytes::new();
        }
    }
}
