//! Quasi http response handling.
//!
//! Unlike real http, the outcome class of a response travels explicitly: exactly one of
//! `status_indicates_success` / `status_indicates_client_error` is authoritative, and both being
//! false means the server failed.

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::protocol::Environment;
use crate::protocol::body::{Body, BoxBody};
use crate::protocol::request::DEFAULT_HTTP_VERSION;

/// Represents a quasi http response.
#[derive(Debug)]
pub struct QuasiResponse {
    pub status_code: StatusCode,
    pub status_message: String,
    pub status_indicates_success: bool,
    pub status_indicates_client_error: bool,
    pub http_version: String,
    pub headers: HeaderMap,
    pub body: Option<BoxBody>,
    pub environment: Environment,
}

impl Default for QuasiResponse {
    fn default() -> Self {
        Self::with_status(StatusCode::OK)
    }
}

impl QuasiResponse {
    /// Creates a response whose outcome flags and message are derived from the status code.
    pub fn with_status(status_code: StatusCode) -> Self {
        Self {
            status_code,
            status_message: status_code.canonical_reason().unwrap_or_default().to_string(),
            status_indicates_success: status_code.is_success(),
            status_indicates_client_error: status_code.is_client_error(),
            http_version: DEFAULT_HTTP_VERSION.to_string(),
            headers: HeaderMap::new(),
            body: None,
            environment: Environment::new(),
        }
    }

    pub fn ok() -> Self {
        Self::with_status(StatusCode::OK)
    }

    /// Attaches a body, replacing any previous one.
    pub fn with_body<B: Body + 'static>(mut self, body: B) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    /// Appends a header value, keeping values already present under the same name.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Returns true if neither outcome flag is set, i.e. the server failed.
    pub fn is_server_error(&self) -> bool {
        !self.status_indicates_success && !self.status_indicates_client_error
    }

    /// The content length declared for this response: the body's, or zero without a body.
    pub fn content_length(&self) -> i64 {
        self.body.as_ref().map_or(0, |body| body.content_length())
    }

    /// The advisory content type of the body, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.body.as_ref().and_then(|body| body.content_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_flags_follow_status() {
        let ok = QuasiResponse::ok();
        assert!(ok.status_indicates_success);
        assert!(!ok.status_indicates_client_error);
        assert_eq!(ok.status_message, "OK");

        let not_found = QuasiResponse::with_status(StatusCode::NOT_FOUND);
        assert!(!not_found.status_indicates_success);
        assert!(not_found.status_indicates_client_error);
        assert!(!not_found.is_server_error());

        let failed = QuasiResponse::with_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(failed.is_server_error());
        assert_eq!(failed.content_length(), 0);
    }
}
