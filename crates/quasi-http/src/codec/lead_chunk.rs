//! Encoder and decoder for lead chunk frames.
//!
//! A lead chunk carries everything of a request or response except the body bytes, framed as
//! `[4-byte big-endian length][payload]`. The version 1 payload layout is (integers big-endian,
//! `str` is a `u32` length followed by UTF-8 bytes):
//!
//! ```text
//! u8   version (1)
//! u8   kind (0 = request, 1 = response)
//! request : str method, str path
//! response: u16 status code, u8 flags (bit0 success, bit1 client error), str status message
//! str  http version
//! i64  content length (negative = unknown)
//! u8   content type present (0/1) [+ str content type]
//! u16  header name count, per name: str name, u16 value count, per value: u32 length + bytes
//! ```
//!
//! Trailing bytes after the last header are rejected.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::ensure;
use crate::protocol::{CodecError, Environment, QuasiRequest, QuasiResponse};

/// Size of the length prefix of a lead chunk frame.
pub const LEAD_CHUNK_PREFIX_SIZE: usize = 4;

/// Version of the lead chunk payload layout written by this crate.
pub const LEAD_CHUNK_VERSION: u8 = 1;

const KIND_REQUEST: u8 = 0;
const KIND_RESPONSE: u8 = 1;

const FLAG_SUCCESS: u8 = 0b01;
const FLAG_CLIENT_ERROR: u8 = 0b10;

/// Metadata of a request or response, as carried by a lead chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadChunk {
    pub kind: LeadChunkKind,
    pub http_version: String,
    pub headers: HeaderMap,
    /// Declared body length: zero for no body, negative when unknown.
    pub content_length: i64,
    pub content_type: Option<String>,
}

/// The part of a lead chunk that differs between requests and responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadChunkKind {
    Request {
        method: Method,
        path: String,
    },
    Response {
        status_code: StatusCode,
        status_message: String,
        status_indicates_success: bool,
        status_indicates_client_error: bool,
    },
}

impl LeadChunk {
    pub fn from_request(request: &QuasiRequest) -> Self {
        Self {
            kind: LeadChunkKind::Request { method: request.method.clone(), path: request.path.clone() },
            http_version: request.http_version.clone(),
            headers: request.headers.clone(),
            content_length: request.content_length(),
            content_type: request.content_type().map(str::to_string),
        }
    }

    pub fn from_response(response: &QuasiResponse) -> Self {
        Self {
            kind: LeadChunkKind::Response {
                status_code: response.status_code,
                status_message: response.status_message.clone(),
                status_indicates_success: response.status_indicates_success,
                status_indicates_client_error: response.status_indicates_client_error,
            },
            http_version: response.http_version.clone(),
            headers: response.headers.clone(),
            content_length: response.content_length(),
            content_type: response.content_type().map(str::to_string),
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self.kind, LeadChunkKind::Request { .. })
    }

    /// Builds a request without body from this lead chunk.
    pub fn into_request(self) -> Result<QuasiRequest, CodecError> {
        match self.kind {
            LeadChunkKind::Request { method, path } => Ok(QuasiRequest {
                path,
                method,
                http_version: self.http_version,
                headers: self.headers,
                body: None,
                environment: Environment::new(),
            }),
            LeadChunkKind::Response { .. } => Err(CodecError::invalid_lead_chunk("expected a request lead chunk")),
        }
    }

    /// Builds a response without body from this lead chunk.
    pub fn into_response(self) -> Result<QuasiResponse, CodecError> {
        match self.kind {
            LeadChunkKind::Response {
                status_code,
                status_message,
                status_indicates_success,
                status_indicates_client_error,
            } => Ok(QuasiResponse {
                status_code,
                status_message,
                status_indicates_success,
                status_indicates_client_error,
                http_version: self.http_version,
                headers: self.headers,
                body: None,
                environment: Environment::new(),
            }),
            LeadChunkKind::Request { .. } => Err(CodecError::invalid_lead_chunk("expected a response lead chunk")),
        }
    }
}

/// Largest lead chunk payload a codec accepts; the length prefix is read as a signed 32-bit value.
pub const MAX_LEAD_CHUNK_SIZE: usize = i32::MAX as usize;

/// Frames lead chunks, rejecting any frame whose payload exceeds `max_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadChunkCodec {
    max_size: usize,
}

impl LeadChunkCodec {
    /// Creates a codec; the ceiling is clamped to [`MAX_LEAD_CHUNK_SIZE`].
    pub fn new(max_size: usize) -> Self {
        Self { max_size: max_size.min(MAX_LEAD_CHUNK_SIZE) }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl Encoder<LeadChunk> for LeadChunkCodec {
    type Error = CodecError;

    fn encode(&mut self, item: LeadChunk, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();
        dst.put_u32(0);

        if let Err(e) = encode_payload(&item, dst) {
            dst.truncate(start);
            return Err(e);
        }

        let size = dst.len() - start - LEAD_CHUNK_PREFIX_SIZE;
        if size > self.max_size {
            dst.truncate(start);
            return Err(CodecError::frame_too_large(size, self.max_size));
        }

        let Ok(prefix) = u32::try_from(size) else {
            dst.truncate(start);
            return Err(CodecError::frame_too_large(size, MAX_LEAD_CHUNK_SIZE));
        };
        dst[start..start + LEAD_CHUNK_PREFIX_SIZE].copy_from_slice(&prefix.to_be_bytes());

        trace!(size, "encoded lead chunk");
        Ok(())
    }
}

impl Decoder for LeadChunkCodec {
    type Item = LeadChunk;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LEAD_CHUNK_PREFIX_SIZE {
            return Ok(None);
        }

        let size = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        ensure!(size <= self.max_size, CodecError::frame_too_large(size, self.max_size));

        let frame_size = LEAD_CHUNK_PREFIX_SIZE + size;
        if src.len() < frame_size {
            src.reserve(frame_size - src.len());
            return Ok(None);
        }

        src.advance(LEAD_CHUNK_PREFIX_SIZE);
        let payload = src.split_to(size).freeze();
        trace!(size, "decoded lead chunk frame");
        decode_payload(payload).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }

        let missing = if src.len() < LEAD_CHUNK_PREFIX_SIZE {
            LEAD_CHUNK_PREFIX_SIZE - src.len()
        } else {
            let size = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
            LEAD_CHUNK_PREFIX_SIZE + size - src.len()
        };
        Err(CodecError::unexpected_end_of_stream(missing))
    }
}

fn encode_payload(item: &LeadChunk, dst: &mut BytesMut) -> Result<(), CodecError> {
    dst.put_u8(LEAD_CHUNK_VERSION);

    match &item.kind {
        LeadChunkKind::Request { method, path } => {
            dst.put_u8(KIND_REQUEST);
            put_str(dst, method.as_str())?;
            put_str(dst, path)?;
        }
        LeadChunkKind::Response {
            status_code,
            status_message,
            status_indicates_success,
            status_indicates_client_error,
        } => {
            dst.put_u8(KIND_RESPONSE);
            dst.put_u16(status_code.as_u16());
            let mut flags = 0;
            if *status_indicates_success {
                flags |= FLAG_SUCCESS;
            }
            if *status_indicates_client_error {
                flags |= FLAG_CLIENT_ERROR;
            }
            dst.put_u8(flags);
            put_str(dst, status_message)?;
        }
    }

    put_str(dst, &item.http_version)?;
    dst.put_i64(item.content_length);

    match &item.content_type {
        Some(content_type) => {
            dst.put_u8(1);
            put_str(dst, content_type)?;
        }
        None => dst.put_u8(0),
    }

    let name_count = u16::try_from(item.headers.keys_len())
        .map_err(|e| CodecError::invalid_lead_chunk(format!("too many header names: {e}")))?;
    dst.put_u16(name_count);
    for name in item.headers.keys() {
        put_str(dst, name.as_str())?;

        let values = item.headers.get_all(name);
        let value_count = u16::try_from(values.iter().count())
            .map_err(|e| CodecError::invalid_lead_chunk(format!("too many values for header {name}: {e}")))?;
        dst.put_u16(value_count);
        for value in values {
            put_bytes(dst, value.as_bytes())?;
        }
    }

    Ok(())
}

fn put_str(dst: &mut BytesMut, str: &str) -> Result<(), CodecError> {
    put_bytes(dst, str.as_bytes())
}

fn put_bytes(dst: &mut BytesMut, bytes: &[u8]) -> Result<(), CodecError> {
    let len = u32::try_from(bytes.len()).map_err(|e| CodecError::invalid_lead_chunk(format!("field too long: {e}")))?;
    dst.put_u32(len);
    dst.put_slice(bytes);
    Ok(())
}

fn decode_payload(payload: Bytes) -> Result<LeadChunk, CodecError> {
    let mut reader = PayloadReader { buf: payload };

    let version = reader.u8()?;
    ensure!(version == LEAD_CHUNK_VERSION, CodecError::UnsupportedVersion(version));

    let kind = match reader.u8()? {
        KIND_REQUEST => {
            let method = reader.str()?;
            let method = Method::from_bytes(method.as_bytes())
                .map_err(|e| CodecError::invalid_lead_chunk(format!("invalid method {method:?}: {e}")))?;
            let path = reader.str()?;
            LeadChunkKind::Request { method, path }
        }
        KIND_RESPONSE => {
            let code = reader.u16()?;
            let status_code = StatusCode::from_u16(code)
                .map_err(|e| CodecError::invalid_lead_chunk(format!("invalid status code {code}: {e}")))?;
            let flags = reader.u8()?;
            let status_message = reader.str()?;
            LeadChunkKind::Response {
                status_code,
                status_message,
                status_indicates_success: flags & FLAG_SUCCESS != 0,
                status_indicates_client_error: flags & FLAG_CLIENT_ERROR != 0,
            }
        }
        other => return Err(CodecError::invalid_lead_chunk(format!("unknown lead chunk kind {other}"))),
    };

    let http_version = reader.str()?;
    let content_length = reader.i64()?;
    let content_type = match reader.u8()? {
        0 => None,
        1 => Some(reader.str()?),
        other => return Err(CodecError::invalid_lead_chunk(format!("invalid content type marker {other}"))),
    };

    let name_count = reader.u16()?;
    let mut headers = HeaderMap::with_capacity(usize::from(name_count));
    for _ in 0..name_count {
        let name = reader.str()?;
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| CodecError::invalid_lead_chunk(format!("invalid header name {name:?}: {e}")))?;

        let value_count = reader.u16()?;
        for _ in 0..value_count {
            let value = reader.bytes()?;
            let value = HeaderValue::from_maybe_shared(value)
                .map_err(|e| CodecError::invalid_lead_chunk(format!("invalid value for header {name}: {e}")))?;
            headers.append(name.clone(), value);
        }
    }

    ensure!(
        !reader.buf.has_remaining(),
        CodecError::invalid_lead_chunk(format!("{} trailing bytes", reader.buf.remaining()))
    );

    Ok(LeadChunk { kind, http_version, headers, content_length, content_type })
}

/// Bounds checked cursor over a lead chunk payload.
struct PayloadReader {
    buf: Bytes,
}

impl PayloadReader {
    fn require(&self, len: usize, field: &str) -> Result<(), CodecError> {
        ensure!(
            self.buf.remaining() >= len,
            CodecError::invalid_lead_chunk(format!("truncated {field}, need {len} bytes"))
        );
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        self.require(1, "u8")?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        self.require(2, "u16")?;
        Ok(self.buf.get_u16())
    }

    fn i64(&mut self) -> Result<i64, CodecError> {
        self.require(8, "i64")?;
        Ok(self.buf.get_i64())
    }

    fn bytes(&mut self) -> Result<Bytes, CodecError> {
        self.require(4, "length")?;
        let len = self.buf.get_u32() as usize;
        self.require(len, "field")?;
        Ok(self.buf.split_to(len))
    }

    fn str(&mut self) -> Result<String, CodecError> {
        let bytes = self.bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|e| CodecError::invalid_lead_chunk(format!("invalid utf-8: {e}")))
    }
}
