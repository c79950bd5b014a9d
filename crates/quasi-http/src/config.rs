//! Options controlling both roles of an exchange.
//!
//! Frame ceilings are configuration rather than protocol constants, so both ends must agree on them
//! out of band or keep the defaults.

use std::time::Duration;

use crate::codec::MAX_BODY_CHUNK_PAYLOAD;

/// Default ceiling for a lead chunk frame, in bytes.
pub const DEFAULT_MAX_LEAD_CHUNK_SIZE: usize = 8 * 1024;

/// Default ceiling for the payload of a single body chunk, in bytes.
pub const DEFAULT_MAX_BODY_CHUNK_SIZE: usize = 8 * 1024;

/// Default ceiling for a buffered response body, in bytes.
pub const DEFAULT_RESPONSE_BODY_BUFFERING_SIZE_LIMIT: usize = 128 * 1024;

/// Options of the send role.
///
/// Every field is optional so per-call options can be layered over client defaults with
/// [`merge`](SendOptions::merge).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Inactivity timeout; `None` or zero disables it.
    pub timeout: Option<Duration>,
    pub max_lead_chunk_size: Option<usize>,
    pub max_body_chunk_size: Option<usize>,
    /// Read the whole response body before returning the response (default `true`).
    pub response_buffering_enabled: Option<bool>,
    pub response_body_buffering_size_limit: Option<usize>,
}

impl SendOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout), ..Self::default() }
    }

    /// Returns these options with unset fields taken from `defaults`.
    pub fn merge(&self, defaults: &SendOptions) -> SendOptions {
        SendOptions {
            timeout: self.timeout.or(defaults.timeout),
            max_lead_chunk_size: self.max_lead_chunk_size.or(defaults.max_lead_chunk_size),
            max_body_chunk_size: self.max_body_chunk_size.or(defaults.max_body_chunk_size),
            response_buffering_enabled: self.response_buffering_enabled.or(defaults.response_buffering_enabled),
            response_body_buffering_size_limit: self
                .response_body_buffering_size_limit
                .or(defaults.response_body_buffering_size_limit),
        }
    }

    pub fn effective_timeout(&self) -> Option<Duration> {
        effective_timeout(self.timeout)
    }

    pub fn effective_max_lead_chunk_size(&self) -> usize {
        self.max_lead_chunk_size.unwrap_or(DEFAULT_MAX_LEAD_CHUNK_SIZE)
    }

    pub fn effective_max_body_chunk_size(&self) -> usize {
        effective_max_body_chunk_size(self.max_body_chunk_size)
    }

    pub fn effective_response_buffering_enabled(&self) -> bool {
        self.response_buffering_enabled.unwrap_or(true)
    }

    pub fn effective_response_body_buffering_size_limit(&self) -> usize {
        self.response_body_buffering_size_limit.unwrap_or(DEFAULT_RESPONSE_BODY_BUFFERING_SIZE_LIMIT)
    }
}

/// Options of the receive role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Inactivity timeout; `None` or zero disables it.
    pub timeout: Option<Duration>,
    pub max_lead_chunk_size: usize,
    pub max_body_chunk_size: usize,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            max_lead_chunk_size: DEFAULT_MAX_LEAD_CHUNK_SIZE,
            max_body_chunk_size: DEFAULT_MAX_BODY_CHUNK_SIZE,
        }
    }
}

impl ReceiveOptions {
    pub fn effective_timeout(&self) -> Option<Duration> {
        effective_timeout(self.timeout)
    }

    pub fn effective_max_body_chunk_size(&self) -> usize {
        effective_max_body_chunk_size(Some(self.max_body_chunk_size))
    }
}

fn effective_timeout(timeout: Option<Duration>) -> Option<Duration> {
    timeout.filter(|timeout| !timeout.is_zero())
}

fn effective_max_body_chunk_size(size: Option<usize>) -> usize {
    size.unwrap_or(DEFAULT_MAX_BODY_CHUNK_SIZE).clamp(1, MAX_BODY_CHUNK_PAYLOAD)
}
