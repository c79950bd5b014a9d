//! Quasi http request handling.
//!
//! A request carries http-like metadata (path, method, version, multi-valued headers) plus an
//! optional streamed [`Body`]. Everything except the body bytes travels in the lead chunk.

use http::{HeaderMap, HeaderName, HeaderValue, Method};

use crate::protocol::Environment;
use crate::protocol::body::{Body, BoxBody};

/// Http version stamped on requests and responses built through the convenience constructors.
pub const DEFAULT_HTTP_VERSION: &str = "HTTP/1.1";

/// Represents a quasi http request.
///
/// The metadata is immutable once the request is handed to a transfer; only the body is consumed.
/// The environment is never serialized: on the receive side it holds whatever the transport
/// attached to the connection.
#[derive(Debug)]
pub struct QuasiRequest {
    pub path: String,
    pub method: Method,
    pub http_version: String,
    pub headers: HeaderMap,
    pub body: Option<BoxBody>,
    pub environment: Environment,
}

impl Default for QuasiRequest {
    fn default() -> Self {
        Self::new(Method::GET, "/")
    }
}

impl QuasiRequest {
    pub fn new<P: Into<String>>(method: Method, path: P) -> Self {
        Self {
            path: path.into(),
            method,
            http_version: DEFAULT_HTTP_VERSION.to_string(),
            headers: HeaderMap::new(),
            body: None,
            environment: Environment::new(),
        }
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

    /// The content length declared for this request: the body's, or zero without a body.
    pub fn content_length(&self) -> i64 {
        self.body.as_ref().map_or(0, |body| body.content_length())
    }

    /// The advisory content type of the body, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.body.as_ref().and_then(|body| body.content_type())
    }
}
